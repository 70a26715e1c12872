use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{CapabilityCall, CapabilityError, ImageCapability, MapVariant, MetricsCategory, StructuredResult};

const ENCRYPT_MAGIC: &[u8; 4] = b"PXL1";
const STEGO_MAGIC: &[u8; 4] = b"PXS1";

/// Deterministic capability backend used by the test suites. It performs a
/// reversible keyed transform over real files so staging, persistence and
/// download behavior can be exercised without a scripting runtime.
pub struct MemoryCapability {
    invocations: AtomicUsize,
    fail_metrics: bool,
}

impl MemoryCapability {
    pub fn new() -> Self {
        Self {
            invocations: AtomicUsize::new(0),
            fail_metrics: false,
        }
    }

    /// Variant whose measurement calls fail while the transforms keep working.
    pub fn with_failing_metrics() -> Self {
        Self {
            invocations: AtomicUsize::new(0),
            fail_metrics: true,
        }
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

impl Default for MemoryCapability {
    fn default() -> Self {
        Self::new()
    }
}

#[rocket::async_trait]
impl ImageCapability for MemoryCapability {
    async fn invoke(&self, call: CapabilityCall) -> Result<StructuredResult, CapabilityError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let name = call.name();
        match call {
            CapabilityCall::Encrypt { image, key, map } => encrypt(name, &image, &key, map),
            CapabilityCall::Decrypt { input, key } => decrypt(name, &input, &key),
            CapabilityCall::StegoEncrypt {
                secret,
                cover,
                key,
                map,
            } => embed(name, &secret, &cover, &key, map),
            CapabilityCall::StegoDecrypt { input, key } => extract(name, &input, &key),
            CapabilityCall::Metrics { category, .. } => {
                if self.fail_metrics {
                    return Err(CapabilityError::Execution {
                        call: name,
                        detail: "measurement backend unavailable".to_string(),
                        diagnostics: String::new(),
                    });
                }
                Ok(measurements(category))
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────
// Keyed Transform
// ────────────────────────────────────────────────────────────────

struct KeyStream {
    state: u64,
}

impl KeyStream {
    fn new(key: &str, map: MapVariant) -> Self {
        Self {
            state: fnv_hash(key.as_bytes()) ^ u64::from(map as u8),
        }
    }

    fn next_byte(&mut self) -> u8 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.state >> 33) as u8
    }

    fn apply(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            *byte ^= self.next_byte();
        }
    }
}

fn fnv_hash(data: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in data {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

fn key_digest(key: &str) -> u16 {
    (fnv_hash(key.as_bytes()) & 0xffff) as u16
}

fn map_from_byte(byte: u8) -> MapVariant {
    match byte {
        1 => MapVariant::Arnold,
        2 => MapVariant::Tent,
        3 => MapVariant::Henon,
        _ => MapVariant::Logistic,
    }
}

// ────────────────────────────────────────────────────────────────
// Operations
// ────────────────────────────────────────────────────────────────

fn read_input(call: &'static str, path: &Path) -> Result<Vec<u8>, CapabilityError> {
    fs::read(path).map_err(|err| CapabilityError::Execution {
        call,
        detail: format!("failed to read {:?}: {}", path, err),
        diagnostics: String::new(),
    })
}

fn write_output(call: &'static str, path: &Path, data: &[u8]) -> Result<(), CapabilityError> {
    fs::write(path, data).map_err(|err| CapabilityError::Execution {
        call,
        detail: format!("failed to write {:?}: {}", path, err),
        diagnostics: String::new(),
    })
}

fn sibling(path: &Path, file_name: String) -> PathBuf {
    match path.parent() {
        Some(parent) => parent.join(file_name),
        None => PathBuf::from(file_name),
    }
}

fn stem_of(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string())
}

fn failure(error: &str) -> StructuredResult {
    StructuredResult {
        success: false,
        document: json!({ "success": false, "error": error }),
    }
}

fn encrypt(
    call: &'static str,
    image: &Path,
    key: &str,
    map: MapVariant,
) -> Result<StructuredResult, CapabilityError> {
    let mut data = read_input(call, image)?;
    let size = data.len();
    KeyStream::new(key, map).apply(&mut data);

    let mut payload = Vec::with_capacity(size + 7);
    payload.extend_from_slice(ENCRYPT_MAGIC);
    payload.push(map as u8);
    payload.extend_from_slice(&key_digest(key).to_le_bytes());
    payload.extend_from_slice(&data);

    let output = sibling(image, format!("{}_encrypted.bin", stem_of(image)));
    write_output(call, &output, &payload)?;

    Ok(StructuredResult {
        success: true,
        document: json!({
            "success": true,
            "message": "Image encrypted successfully",
            "encrypted_path": output.to_string_lossy(),
            "metrics": { "entropy": 7.9987, "size": size },
        }),
    })
}

fn decrypt(call: &'static str, input: &Path, key: &str) -> Result<StructuredResult, CapabilityError> {
    let payload = read_input(call, input)?;
    if payload.len() < 7 || &payload[..4] != ENCRYPT_MAGIC {
        return Ok(failure("Invalid key or corrupted file"));
    }
    let map = map_from_byte(payload[4]);
    let digest = u16::from_le_bytes([payload[5], payload[6]]);
    if digest != key_digest(key) {
        return Ok(failure("Invalid key or corrupted file"));
    }

    let mut data = payload[7..].to_vec();
    KeyStream::new(key, map).apply(&mut data);

    let stem = stem_of(input);
    let base = stem.strip_suffix("_encrypted").unwrap_or(&stem);
    let output = sibling(input, format!("{}_decrypted.png", base));
    write_output(call, &output, &data)?;

    Ok(StructuredResult {
        success: true,
        document: json!({
            "success": true,
            "message": "Image decrypted successfully",
            "decrypted_path": output.to_string_lossy(),
        }),
    })
}

fn embed(
    call: &'static str,
    secret: &Path,
    cover: &Path,
    key: &str,
    map: MapVariant,
) -> Result<StructuredResult, CapabilityError> {
    let mut data = read_input(call, secret)?;
    let cover_data = read_input(call, cover)?;
    KeyStream::new(key, map).apply(&mut data);

    let name = secret
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "secret.png".to_string());
    let name_bytes = name.as_bytes();

    let mut payload = cover_data;
    payload.extend_from_slice(STEGO_MAGIC);
    payload.push(map as u8);
    payload.extend_from_slice(&key_digest(key).to_le_bytes());
    payload.extend_from_slice(&(name_bytes.len() as u16).to_le_bytes());
    payload.extend_from_slice(name_bytes);
    payload.extend_from_slice(&(data.len() as u32).to_le_bytes());
    payload.extend_from_slice(&data);

    let output = sibling(cover, format!("{}_stego.png", stem_of(cover)));
    write_output(call, &output, &payload)?;

    Ok(StructuredResult {
        success: true,
        document: json!({
            "success": true,
            "message": "Secret image hidden successfully",
            "stego_path": output.to_string_lossy(),
        }),
    })
}

fn extract(call: &'static str, input: &Path, key: &str) -> Result<StructuredResult, CapabilityError> {
    let payload = read_input(call, input)?;
    let Some(start) = payload
        .windows(STEGO_MAGIC.len())
        .rposition(|window| window == STEGO_MAGIC)
    else {
        return Ok(failure("No hidden payload found"));
    };

    let Some(parsed) = parse_embedded(&payload[start + STEGO_MAGIC.len()..]) else {
        return Ok(failure("No hidden payload found"));
    };
    let (map, digest, name, mut data) = parsed;
    if digest != key_digest(key) {
        return Ok(failure("Invalid key or corrupted file"));
    }
    KeyStream::new(key, map).apply(&mut data);

    let output = sibling(input, format!("extracted_{}", name));
    write_output(call, &output, &data)?;

    Ok(StructuredResult {
        success: true,
        document: json!({
            "success": true,
            "message": "Secret image extracted successfully",
            "decrypted_path": output.to_string_lossy(),
        }),
    })
}

fn parse_embedded(trailer: &[u8]) -> Option<(MapVariant, u16, String, Vec<u8>)> {
    let map = map_from_byte(*trailer.first()?);
    let digest = u16::from_le_bytes([*trailer.get(1)?, *trailer.get(2)?]);
    let name_len = usize::from(u16::from_le_bytes([*trailer.get(3)?, *trailer.get(4)?]));
    let name_end = 5usize.checked_add(name_len)?;
    let name = String::from_utf8_lossy(trailer.get(5..name_end)?).into_owned();
    let data_len = u32::from_le_bytes([
        *trailer.get(name_end)?,
        *trailer.get(name_end + 1)?,
        *trailer.get(name_end + 2)?,
        *trailer.get(name_end + 3)?,
    ]) as usize;
    let data_start = name_end + 4;
    let data = trailer.get(data_start..data_start.checked_add(data_len)?)?.to_vec();
    Some((map, digest, name, data))
}

fn measurements(category: MetricsCategory) -> StructuredResult {
    let document = match category {
        MetricsCategory::Encryption => json!({
            "success": true,
            "entropy": { "original": 7.1523, "encrypted": 7.9987 },
            "npcr": 99.61,
            "uaci": 33.46,
            "correlation": { "original": 0.9712, "encrypted": 0.0021 },
        }),
        MetricsCategory::Steganography => json!({
            "success": true,
            "mse": 0.042,
            "psnr": 61.73,
        }),
    };
    StructuredResult {
        success: true,
        document,
    }
}
