use rocket::http::{ContentType, Status};
use rocket::local::asynchronous::{Client, LocalResponse};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;

use pixelock::build_rocket;
use pixelock::capability::memory::MemoryCapability;
use pixelock::common::WRONG_KEY_HINT;
use pixelock::database::ops::records::RecordStore;
use pixelock::pipeline::Pipeline;
use pixelock::pipeline::staging::StagingArea;

const BOUNDARY: &str = "X-PIXELOCK-TEST-BOUNDARY";

struct TestService {
    client: Client,
    staging_dir: TempDir,
    _db_dir: TempDir,
    capability: Arc<MemoryCapability>,
}

impl TestService {
    async fn with_capability(capability: MemoryCapability) -> Self {
        let staging_dir = TempDir::new().unwrap();
        let db_dir = TempDir::new().unwrap();
        let capability = Arc::new(capability);

        let staging = StagingArea::new(staging_dir.path()).unwrap();
        let store = RecordStore::open(db_dir.path().join("records.redb")).unwrap();
        let pipeline = Pipeline::new(capability.clone(), staging, store);

        let figment = rocket::figment::Figment::from(rocket::Config::debug_default());
        let client = Client::tracked(build_rocket(figment, pipeline))
            .await
            .expect("valid rocket instance");

        Self {
            client,
            staging_dir,
            _db_dir: db_dir,
            capability,
        }
    }

    async fn new() -> Self {
        Self::with_capability(MemoryCapability::new()).await
    }

    fn staged_file_count(&self) -> usize {
        std::fs::read_dir(self.staging_dir.path()).unwrap().count()
    }

    async fn post_form<'a>(&'a self, uri: &'a str, form: MultipartBuilder) -> LocalResponse<'a> {
        let (content_type, body) = form.finish();
        self.client
            .post(uri)
            .header(content_type)
            .body(body)
            .dispatch()
            .await
    }

    async fn list_images(&self) -> Vec<Value> {
        let response = self.client.get("/api/images").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["success"], Value::Bool(true));
        body["images"].as_array().unwrap().clone()
    }
}

struct MultipartBuilder {
    body: Vec<u8>,
}

impl MultipartBuilder {
    fn new() -> Self {
        Self { body: Vec::new() }
    }

    fn text(mut self, name: &str, value: &str) -> Self {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        self.body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
        );
        self.body.extend_from_slice(value.as_bytes());
        self.body.extend_from_slice(b"\r\n");
        self
    }

    fn file(mut self, name: &str, file_name: &str, content_type: &str, data: &[u8]) -> Self {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        self.body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n")
                .as_bytes(),
        );
        self.body
            .extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    fn finish(mut self) -> (ContentType, Vec<u8>) {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        let content_type = format!("multipart/form-data; boundary={BOUNDARY}")
            .parse::<ContentType>()
            .unwrap();
        (content_type, self.body)
    }
}

fn encrypt_form(key: &str, map: Option<&str>, bytes: &[u8]) -> MultipartBuilder {
    let mut form = MultipartBuilder::new()
        .file("image", "photo.png", "image/png", bytes)
        .text("key", key);
    if let Some(map) = map {
        form = form.text("chaoticMap", map);
    }
    form
}

fn assert_close(value: &Value, expected: f64) {
    let actual = value.as_f64().unwrap();
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

#[rocket::async_test]
async fn encrypting_an_image_creates_one_completed_record() {
    let service = TestService::new().await;
    let image = b"fake png payload for the pipeline".to_vec();

    let started = Instant::now();
    let response = service
        .post_form("/api/encrypt", encrypt_form("hunter22", Some("tent"), &image))
        .await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    assert_eq!(response.status(), Status::Ok);
    let body: Value = response.into_json().await.unwrap();
    assert_eq!(body["success"], Value::Bool(true));
    assert_eq!(body["imageId"].as_str().unwrap().len(), 36);
    assert!(
        body["encryptedName"]
            .as_str()
            .unwrap()
            .ends_with("_encrypted.bin")
    );
    assert!(body["encryptionTime"].as_u64().unwrap() <= elapsed_ms + 50);
    assert_close(&body["metrics"]["entropy"]["encrypted"], 7.9987);
    assert_close(&body["metrics"]["npcr"], 99.61);

    // Encrypt plus one measurement call.
    assert_eq!(service.capability.invocations(), 2);

    let images = service.list_images().await;
    assert_eq!(images.len(), 1);
    let record = &images[0];
    assert_eq!(record["id"], body["imageId"]);
    assert_eq!(record["originalName"], "photo.png");
    assert_eq!(record["operationType"], "basic");
    assert_eq!(record["chaoticMap"], "tent");
    assert_eq!(record["status"], "completed");
    assert_eq!(record["sizeBytes"].as_u64().unwrap(), image.len() as u64);
    assert!(record.get("outputPath").is_none());
    assert!(record.get("inputPath").is_none());

    // Input and output artifacts are the only staged files left behind.
    assert_eq!(service.staged_file_count(), 2);
}

#[rocket::async_test]
async fn a_failed_measurement_degrades_to_zeroed_metrics() {
    let service = TestService::with_capability(MemoryCapability::with_failing_metrics()).await;

    let response = service
        .post_form(
            "/api/encrypt",
            encrypt_form("hunter22", None, b"metrics will be unavailable"),
        )
        .await;

    assert_eq!(response.status(), Status::Ok);
    let body: Value = response.into_json().await.unwrap();
    assert_eq!(body["success"], Value::Bool(true));
    assert_close(&body["metrics"]["entropy"]["encrypted"], 0.0);
    assert_close(&body["metrics"]["npcr"], 0.0);
    assert_close(&body["metrics"]["uaci"], 0.0);

    let images = service.list_images().await;
    assert_eq!(images.len(), 1);
    assert_eq!(images[0]["status"], "completed");
    assert_eq!(service.staged_file_count(), 2);
}

#[rocket::async_test]
async fn short_keys_are_rejected_before_the_capability_runs() {
    let service = TestService::new().await;

    let response = service
        .post_form("/api/encrypt", encrypt_form("1234567", None, b"payload"))
        .await;

    assert_eq!(response.status(), Status::BadRequest);
    let body: Value = response.into_json().await.unwrap();
    assert!(
        body["error"]
            .as_str()
            .unwrap()
            .contains("at least 8 characters")
    );
    assert!(body["chain"].is_array());

    assert_eq!(service.capability.invocations(), 0);
    assert_eq!(service.staged_file_count(), 0);
    assert!(service.list_images().await.is_empty());
}

#[rocket::async_test]
async fn a_form_without_a_key_is_a_client_error() {
    let service = TestService::new().await;

    let form = MultipartBuilder::new().file("image", "photo.png", "image/png", b"payload");
    let response = service.post_form("/api/encrypt", form).await;

    assert_eq!(response.status(), Status::BadRequest);
    let body: Value = response.into_json().await.unwrap();
    assert_eq!(body["error"], "Failed to parse form");
    assert_eq!(service.capability.invocations(), 0);
}

#[rocket::async_test]
async fn download_then_decrypt_restores_the_original_bytes() {
    let service = TestService::new().await;
    let image = b"the exact original bytes".to_vec();

    let response = service
        .post_form("/api/encrypt", encrypt_form("hunter22", None, &image))
        .await;
    assert_eq!(response.status(), Status::Ok);
    let body: Value = response.into_json().await.unwrap();
    let image_id = body["imageId"].as_str().unwrap().to_string();
    let baseline = service.staged_file_count();

    let download = service
        .client
        .get(format!("/api/download/{image_id}"))
        .dispatch()
        .await;
    assert_eq!(download.status(), Status::Ok);
    assert!(
        download
            .headers()
            .get_one("Content-Disposition")
            .unwrap()
            .contains("attachment")
    );
    let encrypted = download.into_bytes().await.unwrap();
    assert_ne!(encrypted, image);

    let decrypt = service
        .post_form(
            "/api/decrypt",
            MultipartBuilder::new()
                .file("image", "photo_encrypted.bin", "application/octet-stream", &encrypted)
                .text("key", "hunter22"),
        )
        .await;
    assert_eq!(decrypt.status(), Status::Ok);
    assert!(
        decrypt
            .headers()
            .get_one("Content-Disposition")
            .unwrap()
            .contains("_decrypted")
    );
    let recovered = decrypt.into_bytes().await.unwrap();
    assert_eq!(recovered, image);

    // The transient decrypt run cleaned up after itself.
    assert_eq!(service.staged_file_count(), baseline);
}

#[rocket::async_test]
async fn decrypting_with_the_wrong_key_fails_with_a_hint() {
    let service = TestService::new().await;

    let response = service
        .post_form("/api/encrypt", encrypt_form("hunter22", None, b"secret bytes"))
        .await;
    let body: Value = response.into_json().await.unwrap();
    let image_id = body["imageId"].as_str().unwrap().to_string();
    let baseline = service.staged_file_count();

    let download = service
        .client
        .get(format!("/api/download/{image_id}"))
        .dispatch()
        .await;
    let encrypted = download.into_bytes().await.unwrap();

    let decrypt = service
        .post_form(
            "/api/decrypt",
            MultipartBuilder::new()
                .file("image", "photo_encrypted.bin", "application/octet-stream", &encrypted)
                .text("key", "not-the-key"),
        )
        .await;
    assert_eq!(decrypt.status(), Status::InternalServerError);
    let body: Value = decrypt.into_json().await.unwrap();
    assert_eq!(body["error"].as_str().unwrap(), "capability 'decrypt' failed: Invalid key or corrupted file");
    assert_eq!(body["hint"].as_str().unwrap(), WRONG_KEY_HINT);

    assert_eq!(service.staged_file_count(), baseline);
}

#[rocket::async_test]
async fn deleting_a_record_removes_its_artifacts() {
    let service = TestService::new().await;

    let response = service
        .post_form("/api/encrypt", encrypt_form("hunter22", None, b"doomed bytes"))
        .await;
    let body: Value = response.into_json().await.unwrap();
    let image_id = body["imageId"].as_str().unwrap().to_string();
    assert_eq!(service.staged_file_count(), 2);

    let delete = service
        .client
        .delete(format!("/api/images/{image_id}"))
        .dispatch()
        .await;
    assert_eq!(delete.status(), Status::Ok);
    let body: Value = delete.into_json().await.unwrap();
    assert_eq!(body["success"], Value::Bool(true));

    assert_eq!(service.staged_file_count(), 0);
    assert!(service.list_images().await.is_empty());

    let again = service
        .client
        .delete(format!("/api/images/{image_id}"))
        .dispatch()
        .await;
    assert_eq!(again.status(), Status::NotFound);
}

#[rocket::async_test]
async fn a_short_stego_key_leaves_nothing_behind() {
    let service = TestService::new().await;

    let form = MultipartBuilder::new()
        .file("secretImage", "secret.png", "image/png", b"hidden payload")
        .file("coverImage", "cover.png", "image/png", b"innocent cover")
        .text("key", "1234567");
    let response = service.post_form("/api/encrypt-stego", form).await;

    assert_eq!(response.status(), Status::BadRequest);
    assert_eq!(service.capability.invocations(), 0);
    assert_eq!(service.staged_file_count(), 0);
    assert!(service.list_images().await.is_empty());
}

#[rocket::async_test]
async fn stego_round_trip_recovers_the_secret_image() {
    let service = TestService::new().await;
    let secret = b"the hidden image bytes".to_vec();
    let cover = b"an innocuous cover image".to_vec();

    let form = MultipartBuilder::new()
        .file("secretImage", "secret.png", "image/png", &secret)
        .file("coverImage", "cover.png", "image/png", &cover)
        .text("key", "hunter22")
        .text("chaoticMap", "arnold");
    let response = service.post_form("/api/encrypt-stego", form).await;

    assert_eq!(response.status(), Status::Ok);
    let body: Value = response.into_json().await.unwrap();
    assert_eq!(body["success"], Value::Bool(true));
    let image_id = body["imageId"].as_str().unwrap().to_string();
    assert!(body["stegoName"].as_str().unwrap().ends_with("_stego.png"));
    assert_close(&body["metrics"]["psnr"], 61.73);

    // The cover upload was transient; only the secret input and the stego
    // output remain.
    assert_eq!(service.staged_file_count(), 2);

    let images = service.list_images().await;
    assert_eq!(images.len(), 1);
    assert_eq!(images[0]["operationType"], "steganography");
    assert_eq!(images[0]["originalName"], "secret.png");
    assert_eq!(images[0]["chaoticMap"], "arnold");

    // The basic download route must not serve a steganography record.
    let wrong_route = service
        .client
        .get(format!("/api/download/{image_id}"))
        .dispatch()
        .await;
    assert_eq!(wrong_route.status(), Status::NotFound);

    let download = service
        .client
        .get(format!("/api/download-stego/{image_id}"))
        .dispatch()
        .await;
    assert_eq!(download.status(), Status::Ok);
    let stego_bytes = download.into_bytes().await.unwrap();
    assert!(stego_bytes.len() > cover.len());

    let extract = service
        .post_form(
            "/api/decrypt-stego",
            MultipartBuilder::new()
                .file("image", "cover_stego.png", "image/png", &stego_bytes)
                .text("key", "hunter22"),
        )
        .await;
    assert_eq!(extract.status(), Status::Ok);
    let recovered = extract.into_bytes().await.unwrap();
    assert_eq!(recovered, secret);

    assert_eq!(service.staged_file_count(), 2);
}

#[rocket::async_test]
async fn stats_cover_the_recent_window() {
    let service = TestService::new().await;
    let first = b"first image bytes".to_vec();
    let second = b"second image, a bit longer".to_vec();
    let secret = b"hidden".to_vec();

    let response = service
        .post_form("/api/encrypt", encrypt_form("hunter22", None, &first))
        .await;
    assert_eq!(response.status(), Status::Ok);
    let response = service
        .post_form("/api/encrypt", encrypt_form("hunter22", Some("henon"), &second))
        .await;
    assert_eq!(response.status(), Status::Ok);

    let form = MultipartBuilder::new()
        .file("secretImage", "secret.png", "image/png", &secret)
        .file("coverImage", "cover.png", "image/png", b"cover bytes")
        .text("key", "hunter22");
    let response = service.post_form("/api/encrypt-stego", form).await;
    assert_eq!(response.status(), Status::Ok);

    let stats = service.client.get("/api/admin/stats").dispatch().await;
    assert_eq!(stats.status(), Status::Ok);
    let body: Value = stats.into_json().await.unwrap();
    assert_eq!(body["success"], Value::Bool(true));
    assert_eq!(body["stats"]["totalRecords"].as_u64().unwrap(), 3);
    assert_eq!(body["stats"]["basicCount"].as_u64().unwrap(), 2);
    assert_eq!(body["stats"]["stegoCount"].as_u64().unwrap(), 1);
    let expected_bytes = (first.len() + second.len() + secret.len()) as u64;
    assert_eq!(body["stats"]["totalBytes"].as_u64().unwrap(), expected_bytes);

    let all = service.client.get("/api/metrics/all").dispatch().await;
    assert_eq!(all.status(), Status::Ok);
    let body: Value = all.into_json().await.unwrap();
    assert_eq!(body["metrics"].as_array().unwrap().len(), 3);

    let aggregated = service.client.get("/api/metrics/stats").dispatch().await;
    assert_eq!(aggregated.status(), Status::Ok);
    let body: Value = aggregated.into_json().await.unwrap();
    let encryption = &body["stats"]["encryption"];
    assert_eq!(encryption["measuredCount"].as_u64().unwrap(), 2);
    assert_close(&encryption["averageEntropyEncrypted"], 7.9987);
    assert_close(&encryption["averageNpcr"], 99.61);
    let steganography = &body["stats"]["steganography"];
    assert_eq!(steganography["measuredCount"].as_u64().unwrap(), 1);
    assert_close(&steganography["averagePsnr"], 61.73);
    assert_close(&steganography["averageMse"], 0.042);
}

#[rocket::async_test]
async fn unknown_record_downloads_are_not_found() {
    let service = TestService::new().await;
    let response = service
        .client
        .get("/api/download/00000000-0000-0000-0000-000000000000")
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::NotFound);
    let body: Value = response.into_json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("no record found"));
}
