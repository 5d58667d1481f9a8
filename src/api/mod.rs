//! Local HTTP/1.1 API over a `ClassificationService`.
//!
//! One request per connection, each connection on its own thread. Uploads are
//! parsed in memory and never touch the filesystem.

mod http;
mod multipart;
pub mod upload;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::classify::ClassificationResult;
use crate::service::ClassificationService;
use http::{read_request, write_response, HttpRequest, ReadOutcome, Response};
use multipart::Form;
use upload::{allowed_file, disallowed_message, secure_filename};

const READ_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
    /// Largest accepted request body.
    pub max_upload_bytes: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:5000".to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    /// Stop accepting connections. Requests already in flight run to completion.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    service: Arc<ClassificationService>,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, service: Arc<ClassificationService>) -> Self {
        Self { cfg, service }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self
            .cfg
            .addr
            .parse()
            .map_err(|e| anyhow!("invalid api address '{}': {}", self.cfg.addr, e))?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        if configured_addr.ip().is_loopback() && !addr.ip().is_loopback() {
            return Err(anyhow!(
                "api configured for loopback address '{}', but bound to non-loopback address '{}'",
                configured_addr,
                addr
            ));
        }
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let cfg = self.cfg;
        let service = self.service;
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, cfg, service, shutdown_thread) {
                log::error!("classifier api stopped: {}", err);
            }
        });

        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(
    listener: TcpListener,
    cfg: ApiConfig,
    service: Arc<ClassificationService>,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    let cfg = Arc::new(cfg);
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                let service = service.clone();
                let cfg = cfg.clone();
                let spawned = std::thread::Builder::new()
                    .name("api-conn".to_string())
                    .spawn(move || {
                        if let Err(err) = handle_connection(stream, &service, &cfg) {
                            log::warn!("request from {} failed: {:#}", peer, err);
                        }
                    });
                if let Err(err) = spawned {
                    log::error!("cannot spawn connection thread: {}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(20));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(
    mut stream: TcpStream,
    service: &ClassificationService,
    cfg: &ApiConfig,
) -> Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(READ_TIMEOUT))?;

    let response = match read_request(&mut stream, cfg.max_upload_bytes)? {
        ReadOutcome::Request(request) => {
            let response = route(&request, service, cfg.max_upload_bytes);
            log::info!("{} {} -> {}", request.method, request.path, response.status);
            response
        }
        ReadOutcome::TooLarge => {
            log::warn!("rejected upload above {} bytes", cfg.max_upload_bytes);
            Response::error(
                413,
                format!("File too large. Maximum size is {}", size_label(cfg.max_upload_bytes)),
            )
        }
        ReadOutcome::BadRequest(message) => Response::error(400, message),
    };
    write_response(&mut stream, &response)?;
    let _ = stream.shutdown(std::net::Shutdown::Write);
    Ok(())
}

fn route(request: &HttpRequest, service: &ClassificationService, max_upload: usize) -> Response {
    let method = request.method.as_str();
    match (request.path.as_str(), method) {
        ("/", "GET") => Response::html(index_page()),
        ("/health", "GET") => Response::raw_json(200, r#"{"status":"ok"}"#),
        ("/categories", "GET") => Response::json(
            200,
            &serde_json::json!({
                "status": "success",
                "categories": service.categories(),
                "supported_objects": service.supported_objects(),
            }),
        ),
        ("/mappings", "GET") => Response::json(
            200,
            &serde_json::json!({ "status": "success", "mappings": service.mapping_table() }),
        ),
        ("/classify", "POST") => classify(request, service, max_upload),
        ("/batch_classify", "POST") => batch_classify(request, service, max_upload),
        ("/add_mapping", "POST") => add_mapping(request, service),
        (
            "/" | "/health" | "/categories" | "/mappings" | "/classify" | "/batch_classify"
            | "/add_mapping",
            _,
        ) => {
            Response::raw_json(405, r#"{"error":"method_not_allowed"}"#)
        }
        _ => Response::raw_json(404, r#"{"error":"not_found"}"#),
    }
}

fn classify(request: &HttpRequest, service: &ClassificationService, max_upload: usize) -> Response {
    let form = match upload_form(request, max_upload) {
        Ok(form) => form,
        Err(response) => return response,
    };
    let threshold = match confidence_field(&form) {
        Ok(threshold) => threshold,
        Err(response) => return response,
    };
    let Some(part) = form.file("image") else {
        return Response::error(400, "No image file provided");
    };
    let filename = part.filename.as_deref().unwrap_or_default();
    if filename.is_empty() {
        return Response::error(400, "No file selected");
    }
    if !allowed_file(filename) {
        return Response::error(400, disallowed_message());
    }

    let result = service.classify(&part.data[..], threshold);
    Response::json(200, &result)
}

#[derive(Serialize)]
struct BatchEntry {
    filename: String,
    #[serde(flatten)]
    result: ClassificationResult,
}

fn batch_classify(
    request: &HttpRequest,
    service: &ClassificationService,
    max_upload: usize,
) -> Response {
    let form = match upload_form(request, max_upload) {
        Ok(form) => form,
        Err(response) => return response,
    };
    let threshold = match confidence_field(&form) {
        Ok(threshold) => threshold,
        Err(response) => return response,
    };
    let parts: Vec<_> = form.files("images").collect();
    if parts.is_empty() {
        return Response::error(400, "No image files provided");
    }
    if parts
        .iter()
        .all(|p| p.filename.as_deref().unwrap_or_default().is_empty())
    {
        return Response::error(400, "No files selected");
    }

    // Rejected uploads keep their slot so results line up with the upload order.
    let mut slots: Vec<Option<ClassificationResult>> = Vec::with_capacity(parts.len());
    let mut accepted: Vec<&[u8]> = Vec::new();
    for part in &parts {
        let filename = part.filename.as_deref().unwrap_or_default();
        if filename.is_empty() {
            slots.push(Some(ClassificationResult::error("No file selected")));
        } else if !allowed_file(filename) {
            slots.push(Some(ClassificationResult::error(disallowed_message())));
        } else {
            slots.push(None);
            accepted.push(&part.data[..]);
        }
    }

    let mut classified = service.classify_batch(accepted.as_slice(), threshold).into_iter();
    let results: Vec<BatchEntry> = parts
        .iter()
        .zip(slots)
        .map(|(part, slot)| BatchEntry {
            filename: secure_filename(part.filename.as_deref().unwrap_or_default()),
            result: slot.or_else(|| classified.next()).unwrap_or_else(|| {
                ClassificationResult::error("image produced no result")
            }),
        })
        .collect();

    let total_images = results.len();
    Response::json(
        200,
        &serde_json::json!({
            "status": "success",
            "results": results,
            "total_images": total_images,
        }),
    )
}

#[derive(Deserialize)]
struct AddMappingBody {
    object_class: Option<String>,
    recyclability: Option<String>,
}

fn add_mapping(request: &HttpRequest, service: &ClassificationService) -> Response {
    let body: AddMappingBody = match serde_json::from_slice(&request.body) {
        Ok(body) => body,
        Err(err) => return Response::error(400, format!("Invalid JSON body: {}", err)),
    };
    let (Some(object_class), Some(recyclability)) = (
        body.object_class.filter(|c| !c.trim().is_empty()),
        body.recyclability.filter(|r| !r.trim().is_empty()),
    ) else {
        return Response::error(400, "Both object_class and recyclability are required");
    };

    match service.add_mapping(&object_class, &recyclability) {
        Ok(mapping) => Response::json(
            200,
            &serde_json::json!({
                "status": "success",
                "message": format!(
                    "Added mapping: {} -> {}",
                    mapping.object_class, mapping.recyclability
                ),
                "mapping": mapping,
            }),
        ),
        Err(err) => Response::error(400, err.message),
    }
}

// Requests that are not multipart carry no files.
fn upload_form(request: &HttpRequest, max_upload: usize) -> Result<Form, Response> {
    let content_type = request.header("content-type").unwrap_or_default();
    let is_multipart = content_type
        .trim_start()
        .get(..19)
        .is_some_and(|m| m.eq_ignore_ascii_case("multipart/form-data"));
    if !is_multipart {
        return Ok(Form::default());
    }
    Form::parse(content_type, &request.body, max_upload).map_err(|err| {
        log::warn!("malformed upload: {}", err);
        Response::error(400, format!("Malformed multipart body: {}", err))
    })
}

fn confidence_field(form: &Form) -> Result<Option<f32>, Response> {
    let Some(raw) = form.text("confidence").filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    match raw.parse::<f32>() {
        Ok(value) if (0.0..=1.0).contains(&value) => Ok(Some(value)),
        _ => Err(Response::error(
            400,
            format!("Invalid confidence '{}'. Must be a number between 0 and 1", raw),
        )),
    }
}

fn size_label(bytes: usize) -> String {
    const MIB: usize = 1024 * 1024;
    if bytes >= MIB && bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else {
        format!("{} bytes", bytes)
    }
}

fn index_page() -> String {
    let endpoints = [
        ("GET", "/", "This page"),
        ("GET", "/health", "Liveness check"),
        ("POST", "/classify", "Classify one image (multipart field 'image', optional 'confidence')"),
        ("POST", "/batch_classify", "Classify several images (repeated multipart field 'images')"),
        ("GET", "/categories", "Recyclability categories and supported object classes"),
        ("GET", "/mappings", "Full object class to category table"),
        ("POST", "/add_mapping", "Add or override a mapping (JSON: object_class, recyclability)"),
    ];
    let rows: String = endpoints
        .iter()
        .map(|(method, path, about)| {
            format!("<li><code>{} {}</code> - {}</li>\n", method, path, about)
        })
        .collect();
    format!(
        "<!DOCTYPE html>\n<html>\n<head><title>Recyclable Waste Classification API</title></head>\n<body>\n<h1>Recyclable Waste Classification API</h1>\n<p>Upload a photo to find out which items are recyclable, compostable or need special handling.</p>\n<ul>\n{}</ul>\n<p>Allowed image types: {}</p>\n</body>\n</html>\n",
        rows,
        upload::ALLOWED_EXTENSIONS.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_label_prefers_megabytes() {
        assert_eq!(size_label(16 * 1024 * 1024), "16MB");
        assert_eq!(size_label(1500), "1500 bytes");
    }

    #[test]
    fn index_lists_every_route() {
        let page = index_page();
        assert!(page.contains("Recyclable Waste Classification API"));
        for path in ["/classify", "/batch_classify", "/categories", "/add_mapping"] {
            assert!(page.contains(path));
        }
    }
}
