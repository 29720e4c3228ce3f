use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use futures::{StreamExt, TryStreamExt};
use log::{error, info, warn};
use sha2::{Digest, Sha256};
use shared::{HealthResponse, ServiceState, StatusResponse};

use crate::error::ScreenError;
use crate::state::AppState;

/// Multipart field name clients post the image under.
pub const FILE_FIELD: &str = "file";

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/").route(web::get().to(read_root)))
        .service(web::resource("/health").route(web::get().to(health)))
        .service(web::resource(vec!["/screen", "/screen/"]).route(web::post().to(screen_image)));
}

struct Upload {
    filename: Option<String>,
    data: Vec<u8>,
}

pub fn calculate_image_hash(image_data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(image_data);
    hex::encode(hasher.finalize())
}

async fn read_root() -> HttpResponse {
    HttpResponse::Ok().json(StatusResponse {
        status: "running".into(),
    })
}

async fn health(state: web::Data<AppState>) -> HttpResponse {
    let status = if state.is_ready() {
        ServiceState::Ready
    } else {
        ServiceState::Degraded
    };
    HttpResponse::Ok().json(HealthResponse {
        status,
        models_loaded: state.is_ready(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        reason: state.degraded_reason().map(str::to_owned),
    })
}

/// Picks the `file` part, or failing that the first part that carries a filename.
async fn read_upload(payload: &mut Multipart, limit: usize) -> Result<Upload, ScreenError> {
    let mut chosen: Option<Upload> = None;

    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|e| ScreenError::Upload(e.to_string()))?
    {
        let is_file_field = field.name() == Some(FILE_FIELD);
        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_owned);
        let wanted = is_file_field || (chosen.is_none() && filename.is_some());

        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| ScreenError::Upload(e.to_string()))?;
            if !wanted {
                continue;
            }
            if data.len() + chunk.len() > limit {
                return Err(ScreenError::PayloadTooLarge { limit });
            }
            data.extend_from_slice(&chunk);
        }

        if wanted {
            chosen = Some(Upload { filename, data });
            if is_file_field {
                break;
            }
        }
    }

    chosen.ok_or(ScreenError::MissingFile)
}

async fn screen_image(
    state: web::Data<AppState>,
    mut payload: Multipart,
) -> Result<HttpResponse, ScreenError> {
    let Some(context) = state.context() else {
        warn!("Rejecting screening request: models are not loaded");
        return Err(ScreenError::ModelsUnavailable);
    };

    let upload = read_upload(&mut payload, state.max_upload_bytes).await?;
    let filename = upload.filename.unwrap_or_default();
    info!(
        "Screening '{}' ({} bytes, sha256 {})",
        filename,
        upload.data.len(),
        calculate_image_hash(&upload.data)
    );

    let preprocessor = state.preprocessor;
    let image_data = upload.data;
    let result = web::block(move || -> Result<_, ScreenError> {
        let pixels = preprocessor.preprocess(&image_data)?;
        Ok(context.screen(pixels)?)
    })
    .await
    .map_err(|e| ScreenError::Blocking(e.to_string()))?;

    match result {
        Ok(verdict) => {
            info!(
                "Verdict for '{}': {} (confidence {:.4})",
                filename, verdict.risk_level, verdict.confidence
            );
            Ok(HttpResponse::Ok().json(verdict.into_response(filename)))
        }
        Err(e) => {
            match &e {
                ScreenError::Decode(_) => warn!("Rejected upload '{}': {}", filename, e),
                _ => error!("Screening failed for '{}': {}", filename, e),
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_hash_is_hex_sha256() {
        assert_eq!(
            calculate_image_hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
