use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use docshield::crypto::{encrypt_payload, KeyMaterial};
use docshield::{
    ClientContext, Clock, DeliveryConfig, DocumentMetadata, DocumentStatus, FilePayloadSource,
    JsonRegistryCatalog, ManualClock, PngRasterizer, SecureDelivery, SqliteDatabase,
    WatermarkPolicy,
};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};

pub const DOC_ID: &str = "doc-1";

/// Everything a test needs to drive one on-disk deployment.
pub struct Deployment {
    pub delivery: SecureDelivery,
    pub clock: Arc<ManualClock>,
    pub catalog: Arc<JsonRegistryCatalog>,
}

pub fn white_page(width: u32, height: u32) -> Vec<u8> {
    let mut out = Vec::new();
    DynamicImage::ImageRgba8(RgbaImage::from_pixel(
        width,
        height,
        Rgba([255, 255, 255, 255]),
    ))
    .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
    .expect("encode test page");
    out
}

pub fn client(ip: &str) -> ClientContext {
    ClientContext::new(ip).with_user_agent("integration-test")
}

/// Registry, encrypted payload and SQLite database under `dir`.
pub fn deploy(dir: &Path, config: DeliveryConfig) -> Deployment {
    let key = KeyMaterial::generate().expect("generate key");
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let now = clock.now();

    std::fs::create_dir_all(dir.join("payloads")).expect("payload dir");
    let encrypted = encrypt_payload(&white_page(240, 160), &key).expect("encrypt page");
    std::fs::write(dir.join("payloads").join("doc-1.enc"), encrypted).expect("write payload");

    let catalog = Arc::new(JsonRegistryCatalog::open(dir.join("registry.json")).expect("registry"));
    catalog
        .upsert(
            DocumentMetadata {
                doc_id: DOC_ID.into(),
                title: "Quarterly report".into(),
                encrypted_path: "doc-1.enc".into(),
                content_type: "image/png".into(),
                page_count: Some(1),
                is_encrypted: true,
                watermark_policy: WatermarkPolicy {
                    show_ip: true,
                    show_timestamp: false,
                    show_session_id: true,
                    custom_text: Some("Internal".into()),
                },
                status: DocumentStatus::Active,
                created_at: now,
                updated_at: now,
            },
            now,
        )
        .expect("register document");

    let db = Arc::new(SqliteDatabase::open(dir.join("delivery.db")).expect("open database"));
    let delivery = SecureDelivery::builder(
        key,
        catalog.clone(),
        Arc::new(FilePayloadSource::new(dir.join("payloads"))),
        Arc::new(PngRasterizer),
    )
    .config(config)
    .clock(clock.clone())
    .sqlite(db)
    .build()
    .expect("build delivery");

    Deployment {
        delivery,
        clock,
        catalog,
    }
}
