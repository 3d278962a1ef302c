use actix_files::NamedFile;
use actix_multipart::Multipart;
use actix_web::{HttpRequest, HttpResponse, web};
use futures::TryStreamExt;
use log::{error, warn};
use serde::Deserialize;
use shared::{ErrorResponse, MessageResponse};

use crate::pipeline::{PredictionError, Predictor, StagingError};
use crate::storage::{LocalObjectStore, ObjectStoreError};

/// Multipart field carrying the image.
pub const IMAGE_FIELD: &str = "image";

pub fn configure_routes(cfg: &mut web::ServiceConfig, local_store: Option<LocalObjectStore>) {
    cfg.service(web::resource("/").route(web::get().to(health_check)))
        .service(web::resource("/predict").route(web::post().to(handle_predict)))
        .service(web::resource("/history").route(web::get().to(get_history)));

    if let Some(store) = local_store {
        cfg.app_data(web::Data::new(store))
            .service(web::resource("/objects/{name}").route(web::get().to(get_object)));
    }
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().body("Model is running!")
}

async fn handle_predict(predictor: web::Data<Predictor>, mut payload: Multipart) -> HttpResponse {
    let mut staged = None;

    loop {
        let field = match payload.try_next().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                let e = PredictionError::Staging(StagingError::Payload(e.to_string()));
                warn!("Rejected upload: {}", e);
                return error_response(&e);
            }
        };
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        // Only file parts count as an image; a plain form value does not.
        let file_name = match field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .filter(|name| !name.is_empty())
        {
            Some(name) => name.to_string(),
            None => continue,
        };
        match predictor.stage(&file_name, field).await {
            Ok(file) => staged = Some(file),
            Err(e) => return error_response(&e),
        }
        break;
    }

    match predictor.predict(staged).await {
        Ok(result) => HttpResponse::Ok().json(result),
        Err(e) => error_response(&e),
    }
}

fn error_response(err: &PredictionError) -> HttpResponse {
    let body = ErrorResponse {
        error: err.public_message(),
    };
    match err {
        PredictionError::Staging(StagingError::TooLarge { .. }) => {
            HttpResponse::PayloadTooLarge().json(body)
        }
        e if e.is_client_error() => HttpResponse::BadRequest().json(body),
        _ => HttpResponse::InternalServerError().json(body),
    }
}

async fn get_history(predictor: web::Data<Predictor>) -> HttpResponse {
    match predictor.history().snapshot().await {
        Ok(Some(entries)) => HttpResponse::Ok().json(entries),
        Ok(None) => HttpResponse::Ok().json(MessageResponse {
            message: "No history found".into(),
        }),
        Err(e) => {
            error!("Failed to read history: {}", e);
            HttpResponse::InternalServerError().json(ErrorResponse {
                error: "Failed to read history".into(),
            })
        }
    }
}

#[derive(Deserialize)]
struct SignedQuery {
    expires: i64,
    signature: String,
}

async fn get_object(
    req: HttpRequest,
    store: web::Data<LocalObjectStore>,
    path: web::Path<String>,
    query: web::Query<SignedQuery>,
) -> HttpResponse {
    let name = path.into_inner();
    match store.verify(&name, query.expires, &query.signature) {
        Ok(file_path) => match NamedFile::open_async(&file_path).await {
            Ok(file) => file.into_response(&req),
            Err(e) => {
                error!("Failed to open object {}: {}", file_path.display(), e);
                HttpResponse::NotFound().finish()
            }
        },
        Err(ObjectStoreError::NotFound(_)) | Err(ObjectStoreError::InvalidName(_)) => {
            HttpResponse::NotFound().finish()
        }
        Err(e) => {
            warn!("Rejected object request for {}: {}", name, e);
            HttpResponse::Forbidden().json(ErrorResponse {
                error: "Invalid or expired signature".into(),
            })
        }
    }
}
