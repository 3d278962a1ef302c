use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client as S3Client;
use dermascan_backend::config::{AppConfig, ModelConfig, StorageConfig};
use dermascan_backend::history::{HistoryLedger, JsonFileLedger};
use dermascan_backend::inference::{Classifier, ImagePreprocessor, LabelSet};
use dermascan_backend::pipeline::{Predictor, StagingArea};
use dermascan_backend::routes::configure_routes;
use dermascan_backend::storage::{LocalObjectStore, ObjectStore, S3Service};
use std::sync::Arc;

fn startup_error(context: &str, err: impl std::fmt::Display) -> std::io::Error {
    log::error!("{}: {}", context, err);
    std::io::Error::other(format!("{}: {}", context, err))
}

#[cfg(feature = "torch")]
fn load_classifier(
    config: &AppConfig,
    model_config: &ModelConfig,
    labels: LabelSet,
) -> std::io::Result<Arc<dyn Classifier>> {
    let model = dermascan_backend::inference::model::TorchModel::load(
        &config.model_path,
        labels,
        model_config.layout,
        model_config.apply_softmax,
    )
    .map_err(|e| startup_error("Model loading failed", e))?;
    Ok(Arc::new(model))
}

#[cfg(not(feature = "torch"))]
fn load_classifier(
    config: &AppConfig,
    _model_config: &ModelConfig,
    _labels: LabelSet,
) -> std::io::Result<Arc<dyn Classifier>> {
    Err(startup_error(
        "Model loading failed",
        format!(
            "cannot load {} without the `torch` feature",
            config.model_path.display()
        ),
    ))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = AppConfig::from_env().map_err(|e| startup_error("Invalid configuration", e))?;
    let model_config = ModelConfig::load(config.model_config.as_deref())
        .map_err(|e| startup_error("Invalid model configuration", e))?;
    let labels = match &model_config.labels {
        Some(names) => {
            LabelSet::from_names(names).map_err(|e| startup_error("Invalid label set", e))?
        }
        None => LabelSet::default(),
    };

    let classifier = load_classifier(&config, &model_config, labels)?;

    let (store, local_store): (Arc<dyn ObjectStore>, Option<LocalObjectStore>) =
        match &config.storage {
            StorageConfig::S3 { bucket } => {
                let aws_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
                let s3_service = S3Service::new(
                    S3Client::new(&aws_config),
                    bucket.clone(),
                    config.signed_url_ttl,
                );
                log::info!("Storing uploads in S3 bucket {}", s3_service.bucket_name());
                (Arc::new(s3_service), None)
            }
            StorageConfig::Local {
                root,
                public_base_url,
                signing_key,
            } => {
                let local = LocalObjectStore::new(
                    root.clone(),
                    public_base_url.clone(),
                    signing_key,
                    config.signed_url_ttl,
                )
                .map_err(|e| startup_error("Cannot prepare local bucket", e))?;
                log::info!("Storing uploads under {}", local.root().display());
                (Arc::new(local.clone()), Some(local))
            }
        };

    let json_ledger = JsonFileLedger::new(&config.history_file);
    log::info!("Recording history in {}", json_ledger.path().display());
    let ledger: Arc<dyn HistoryLedger> = Arc::new(json_ledger);
    let staging = StagingArea::new(&config.upload_dir, config.max_upload_bytes)
        .map_err(|e| startup_error("Cannot create upload directory", e))?;

    let predictor = web::Data::new(Predictor::new(
        staging,
        ImagePreprocessor::new(model_config.image_size),
        classifier,
        store,
        ledger,
    ));

    let bind_address = config.bind_address();
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(predictor.clone())
            .configure(|cfg| configure_routes(cfg, local_store.clone()))
    })
    .bind(&bind_address)?
    .run()
    .await
}
