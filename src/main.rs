use actix_cors::Cors;
use actix_web::{web, App, HttpResponse, HttpServer, middleware::Logger};
use serde::Serialize;

mod config;
mod content;
mod error;
mod qr;
mod storage;

use config::Config;
use content::ContentType;
use error::{ApiError, CLEANUP_FAILED, DOWNLOAD_FAILED, GENERATE_FAILED};
use qr::{to_data_url, QrRequest, QrService};
use storage::TempStorage;

const INDEX_HTML: &str = include_str!("../static/index.html");
const SCRIPT_JS: &str = include_str!("../static/script.js");
const STYLE_CSS: &str = include_str!("../static/style.css");

#[derive(Serialize)]
struct ServerInfo {
    message: String,
    status: String,
    version: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    success: bool,
    qr_code: String,
    text: String,
    content_type: ContentType,
    size: u32,
}

#[derive(Serialize)]
struct CleanupResponse {
    message: String,
    deleted: usize,
}

// Страница генератора
async fn index() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(INDEX_HTML)
}

async fn script() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("application/javascript; charset=utf-8")
        .body(SCRIPT_JS)
}

async fn style() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/css; charset=utf-8")
        .body(STYLE_CSS)
}

async fn info() -> HttpResponse {
    HttpResponse::Ok().json(ServerInfo {
        message: "QR Code Generator API".to_string(),
        status: "running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Кодирование и упаковка PNG занимают CPU, уносим их из event loop
async fn render_png(qr: web::Data<QrService>, req: &QrRequest) -> Result<(String, u32, Vec<u8>), ApiError> {
    let text = req.text()?.to_string();
    let options = qr.options_for(req)?;
    let size = options.size;

    let render_text = text.clone();
    let png = web::block(move || qr.render_png(&render_text, &options))
        .await
        .map_err(|e| ApiError::internal(GENERATE_FAILED, anyhow::anyhow!("render task failed: {}", e)))??;

    Ok((text, size, png))
}

// Сгенерировать QR код для предпросмотра
async fn generate(
    qr: web::Data<QrService>,
    req: web::Json<QrRequest>,
) -> Result<HttpResponse, ApiError> {
    let req = req.into_inner();

    let (text, size, png) = render_png(qr, &req).await.map_err(|e| {
        if e.is_internal() {
            log::error!("Error generating QR code: {}", e);
        }
        e
    })?;

    let content_type = ContentType::detect(text.trim());
    log::info!(
        "Generated {}px QR code ({}, {} chars)",
        size,
        content_type.label(),
        text.chars().count()
    );

    Ok(HttpResponse::Ok().json(GenerateResponse {
        success: true,
        qr_code: to_data_url(&png),
        text,
        content_type,
        size,
    }))
}

// Скачать QR код файлом: пишем во временную папку, отдаём, удаляем
async fn download(
    qr: web::Data<QrService>,
    storage: web::Data<TempStorage>,
    req: web::Json<QrRequest>,
) -> Result<HttpResponse, ApiError> {
    let req = req.into_inner();

    let result = async {
        let (_, _, png) = render_png(qr, &req).await?;

        let file = storage
            .write_png(&png)
            .await
            .map_err(|e| ApiError::internal(DOWNLOAD_FAILED, e))?;
        let bytes = storage
            .take(&file)
            .await
            .map_err(|e| ApiError::internal(DOWNLOAD_FAILED, e))?;

        Ok::<_, ApiError>((file.download_name, bytes))
    }
    .await
    .map_err(|e| e.with_context(DOWNLOAD_FAILED));

    let (filename, bytes) = match result {
        Ok(ok) => ok,
        Err(e) => {
            if e.is_internal() {
                log::error!("Error generating QR code for download: {}", e);
            }
            return Err(e);
        }
    };

    log::info!("Sending {} ({} bytes)", filename, bytes.len());

    Ok(HttpResponse::Ok()
        .content_type("image/png")
        .append_header((
            "Content-Disposition",
            format!("attachment; filename=\"{}\"", filename),
        ))
        .body(bytes))
}

// Удалить старые временные файлы
async fn cleanup(storage: web::Data<TempStorage>) -> Result<HttpResponse, ApiError> {
    match storage.sweep().await {
        Ok(deleted) => Ok(HttpResponse::Ok().json(CleanupResponse {
            message: format!("Cleaned up {} temporary files", deleted),
            deleted,
        })),
        Err(e) => {
            log::error!("Error cleaning up temp files: {}", e);
            Err(ApiError::internal(CLEANUP_FAILED, e))
        }
    }
}

fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(64 * 1024)
        .error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into())
}

fn configure(
    cfg: &mut web::ServiceConfig,
    qr: web::Data<QrService>,
    storage: web::Data<TempStorage>,
) {
    cfg.app_data(qr)
        .app_data(storage)
        .app_data(json_config())
        .route("/", web::get().to(index))
        .route("/script.js", web::get().to(script))
        .route("/style.css", web::get().to(style))
        .route("/api/info", web::get().to(info))
        .route("/generate", web::post().to(generate))
        .route("/download", web::post().to(download))
        .route("/cleanup", web::get().to(cleanup));
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();
    println!("🔳 Starting QR Code Generator server...");

    let config = Config::load()?;

    let storage = TempStorage::new(&config.storage.temp_dir, config.temp_max_age()).await?;
    let qr = web::Data::new(QrService::new(config.qr.clone()));

    log::info!(
        "Temp dir: {} (max age {}s, sweep every {}s)",
        storage.dir().display(),
        storage.max_age().as_secs(),
        config.storage.sweep_interval_secs
    );

    storage::spawn_sweeper(storage.clone(), config.sweep_interval());
    let storage = web::Data::new(storage);
    println!("🚀 Server running on http://{}", config.bind_address());

    HttpServer::new(move || {
        let cors = Cors::default().allow_any_origin().allow_any_method().allow_any_header().max_age(3600);
        App::new()
            .wrap(cors)
            .wrap(Logger::default())
            .configure(|cfg| configure(cfg, qr.clone(), storage.clone()))
    })
        .bind(config.bind_address())?
        .run()
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::{header, StatusCode};
    use actix_web::test;
    use serde_json::{json, Value};
    use std::time::Duration;

    async fn state(dir: &std::path::Path) -> (web::Data<QrService>, web::Data<TempStorage>) {
        let qr = web::Data::new(QrService::new(config::QrConfig::default()));
        let storage = TempStorage::new(dir, Duration::from_secs(3600)).await.unwrap();
        (qr, web::Data::new(storage))
    }

    #[actix_web::test]
    async fn test_generate_returns_data_url() {
        let tmp = tempfile::tempdir().unwrap();
        let (qr, storage) = state(tmp.path()).await;
        let app = test::init_service(App::new().configure(|cfg| configure(cfg, qr, storage))).await;

        let req = test::TestRequest::post()
            .uri("/generate")
            .set_json(json!({"text": "https://example.com", "size": "250", "color": "#112233"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["text"], "https://example.com");
        assert_eq!(body["contentType"], "URL");
        assert_eq!(body["size"], 250);
        assert!(body["qrCode"].as_str().unwrap().starts_with("data:image/png;base64,"));
    }

    #[actix_web::test]
    async fn test_generate_rejects_blank_text() {
        let tmp = tempfile::tempdir().unwrap();
        let (qr, storage) = state(tmp.path()).await;
        let app = test::init_service(App::new().configure(|cfg| configure(cfg, qr, storage))).await;

        for body in [json!({"text": ""}), json!({"text": "   "}), json!({"size": 300})] {
            let req = test::TestRequest::post().uri("/generate").set_json(body).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

            let body: Value = test::read_body_json(resp).await;
            assert_eq!(body["error"], "Text is required to generate QR code");
        }
    }

    #[actix_web::test]
    async fn test_generate_rejects_bad_color() {
        let tmp = tempfile::tempdir().unwrap();
        let (qr, storage) = state(tmp.path()).await;
        let app = test::init_service(App::new().configure(|cfg| configure(cfg, qr, storage))).await;

        let req = test::TestRequest::post()
            .uri("/generate")
            .set_json(json!({"text": "hi", "backgroundColor": "white"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().unwrap().contains("white"));
    }

    #[actix_web::test]
    async fn test_generate_rejects_size_below_symbol() {
        let tmp = tempfile::tempdir().unwrap();
        let (qr, storage) = state(tmp.path()).await;
        let app = test::init_service(App::new().configure(|cfg| configure(cfg, qr, storage))).await;

        let req = test::TestRequest::post()
            .uri("/generate")
            .set_json(json!({"text": "a".repeat(1000), "size": 100}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: Value = test::read_body_json(resp).await;
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("Size too small for this content"));
    }

    #[actix_web::test]
    async fn test_generate_rejects_non_numeric_margin() {
        let tmp = tempfile::tempdir().unwrap();
        let (qr, storage) = state(tmp.path()).await;
        let app = test::init_service(App::new().configure(|cfg| configure(cfg, qr, storage))).await;

        let req = test::TestRequest::post()
            .uri("/generate")
            .set_json(json!({"text": "hi", "margin": "wide"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Margin must be a number, got \"wide\"");
    }

    #[actix_web::test]
    async fn test_malformed_json_is_bad_request() {
        let tmp = tempfile::tempdir().unwrap();
        let (qr, storage) = state(tmp.path()).await;
        let app = test::init_service(App::new().configure(|cfg| configure(cfg, qr, storage))).await;

        let req = test::TestRequest::post()
            .uri("/generate")
            .insert_header((header::CONTENT_TYPE, "application/json"))
            .set_payload("{not json")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().unwrap().starts_with("Invalid request body"));
    }

    #[actix_web::test]
    async fn test_download_streams_png_and_removes_temp_file() {
        let tmp = tempfile::tempdir().unwrap();
        let (qr, storage) = state(tmp.path()).await;
        let app = test::init_service(App::new().configure(|cfg| configure(cfg, qr, storage))).await;

        let req = test::TestRequest::post()
            .uri("/download")
            .set_json(json!({"text": "download me", "size": 200, "margin": 2}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let headers = resp.headers();
        assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "image/png");
        let disposition = headers.get(header::CONTENT_DISPOSITION).unwrap().to_str().unwrap();
        assert!(disposition.starts_with("attachment; filename=\"qr-code-"));

        let bytes = test::read_body(resp).await;
        let img = image::load_from_memory(&bytes).unwrap().to_rgb8();
        assert_eq!(img.dimensions(), (200, 200));

        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[actix_web::test]
    async fn test_download_rejects_blank_text() {
        let tmp = tempfile::tempdir().unwrap();
        let (qr, storage) = state(tmp.path()).await;
        let app = test::init_service(App::new().configure(|cfg| configure(cfg, qr, storage))).await;

        let req = test::TestRequest::post()
            .uri("/download")
            .set_json(json!({"text": "\t"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_cleanup_reports_count() {
        let tmp = tempfile::tempdir().unwrap();
        let (qr, storage) = state(tmp.path()).await;
        storage.write_png(b"fresh").await.unwrap();
        let app = test::init_service(App::new().configure(|cfg| configure(cfg, qr, storage))).await;

        let req = test::TestRequest::get().uri("/cleanup").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "Cleaned up 0 temporary files");
        assert_eq!(body["deleted"], 0);
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[::core::prelude::v1::test]
    fn test_script_handles_touch_and_downloads_previewed_settings() {
        for id in ["generateBtn", "downloadBtn", "resetBtn"] {
            assert!(SCRIPT_JS.contains(&format!("onTap({},", id)), "{} has no tap handler", id);
        }
        assert!(SCRIPT_JS.contains("addEventListener('touchend'"));
        assert!(SCRIPT_JS.contains("onTap(button,"));
        // Скачивание идёт по телу последней генерации, а не по текущей форме
        assert!(SCRIPT_JS.contains("post('/download', lastBody)"));
        assert!(!SCRIPT_JS.contains("post('/download', formBody())"));
    }

    #[actix_web::test]
    async fn test_index_and_assets() {
        let tmp = tempfile::tempdir().unwrap();
        let (qr, storage) = state(tmp.path()).await;
        let app = test::init_service(App::new().configure(|cfg| configure(cfg, qr, storage))).await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = test::read_body(resp).await;
        assert!(std::str::from_utf8(&body).unwrap().contains("qr-content"));

        for uri in ["/script.js", "/style.css", "/api/info"] {
            let resp = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
            assert_eq!(resp.status(), StatusCode::OK, "{}", uri);
        }
    }
}
