use docshield::{AuditAction, AuditQuery, Clock, DeliveryConfig, DeliveryError};
use image::ImageFormat;

use crate::helpers::{client, deploy, DOC_ID};

// ============================================================================
// Mint / consume scenario
// ============================================================================

#[test]
fn nonce_is_good_for_exactly_one_request() {
    let dir = tempfile::tempdir().unwrap();
    let d = deploy(dir.path(), DeliveryConfig::default());
    let visitor = client("203.0.113.9");

    let minted = d.delivery.mint_session(DOC_ID, &visitor).unwrap();
    let view = d.delivery.open_document(DOC_ID, &minted.nonce, &visitor).unwrap();
    assert_eq!(view.session_id, minted.session_id);
    assert_eq!(view.title, "Quarterly report");

    let replay = d.delivery.open_document(DOC_ID, &minted.nonce, &visitor);
    assert!(matches!(replay, Err(DeliveryError::NotFound)));

    let session: Vec<_> = d
        .delivery
        .session_log(&minted.session_id)
        .unwrap()
        .into_iter()
        .map(|e| e.action)
        .collect();
    assert_eq!(session, vec![AuditAction::NonceMint, AuditAction::NonceConsume]);

    let mints = d
        .delivery
        .access_log(DOC_ID, &AuditQuery::action(AuditAction::NonceMint))
        .unwrap();
    assert_eq!(mints.len(), 1);
    assert_eq!(mints[0].client.as_deref(), Some("203.0.113.9"));
    assert_eq!(mints[0].user_agent.as_deref(), Some("integration-test"));
}

#[test]
fn nonce_for_another_document_is_indistinguishable_from_unknown() {
    let dir = tempfile::tempdir().unwrap();
    let d = deploy(dir.path(), DeliveryConfig::default());
    let visitor = client("203.0.113.9");
    let minted = d.delivery.mint_session(DOC_ID, &visitor).unwrap();

    let wrong_doc = d.delivery.open_document("doc-2", &minted.nonce, &visitor);
    let unknown = d.delivery.open_document(DOC_ID, &"0".repeat(48), &visitor);
    assert_eq!(
        wrong_doc.unwrap_err().to_string(),
        unknown.unwrap_err().to_string()
    );

    // Neither attempt burned the real nonce.
    assert!(d.delivery.open_document(DOC_ID, &minted.nonce, &visitor).is_ok());
}

// ============================================================================
// Page delivery
// ============================================================================

#[test]
fn delivered_page_is_decrypted_and_watermarked() {
    let dir = tempfile::tempdir().unwrap();
    let d = deploy(dir.path(), DeliveryConfig::default());
    let visitor = client("198.51.100.4");

    let first = d.delivery.mint_session(DOC_ID, &visitor).unwrap();
    let page = d
        .delivery
        .deliver_page(DOC_ID, &first.nonce, 1, &visitor)
        .unwrap();
    assert_eq!(page.page_count, 1);
    assert_eq!(
        page.watermark_text,
        format!(
            "IP: 198.51.100.4 | Session: {} | Internal",
            &first.session_id[..8]
        )
    );

    let decoded = image::load_from_memory_with_format(&page.png, ImageFormat::Png)
        .unwrap()
        .to_rgba8();
    assert_eq!(decoded.dimensions(), (240, 160));
    assert!(decoded.pixels().any(|p| p.0 != [255, 255, 255, 255]));

    let logged = d
        .delivery
        .access_log(DOC_ID, &AuditQuery::action(AuditAction::PageRequest))
        .unwrap();
    let metadata = logged[0].metadata.as_ref().unwrap();
    assert_eq!(metadata["page"], 1);
    assert_eq!(metadata["watermark"], page.watermark_text.as_str());
}

#[test]
fn out_of_range_page_consumes_the_nonce_and_fails() {
    let dir = tempfile::tempdir().unwrap();
    let d = deploy(dir.path(), DeliveryConfig::default());
    let visitor = client("198.51.100.4");

    let minted = d.delivery.mint_session(DOC_ID, &visitor).unwrap();
    let err = d
        .delivery
        .deliver_page(DOC_ID, &minted.nonce, 2, &visitor)
        .unwrap_err();
    assert!(matches!(err, DeliveryError::Render(_)));
    assert!(!d.delivery.nonces().is_valid(DOC_ID, &minted.nonce).unwrap());

    let zero = d.delivery.deliver_page(DOC_ID, &minted.nonce, 0, &visitor);
    assert!(matches!(zero, Err(DeliveryError::Validation(_))));
}

#[test]
fn deactivated_document_stops_serving() {
    let dir = tempfile::tempdir().unwrap();
    let d = deploy(dir.path(), DeliveryConfig::default());
    let visitor = client("198.51.100.4");

    let minted = d.delivery.mint_session(DOC_ID, &visitor).unwrap();
    assert!(d.catalog.deactivate(DOC_ID, d.clock.now()).unwrap());

    let err = d
        .delivery
        .deliver_page(DOC_ID, &minted.nonce, 1, &visitor)
        .unwrap_err();
    assert!(matches!(err, DeliveryError::NotFound));
    assert!(matches!(
        d.delivery.mint_session(DOC_ID, &visitor),
        Err(DeliveryError::NotFound)
    ));
}

#[test]
fn audit_survives_reopening_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let session_id = {
        let d = deploy(dir.path(), DeliveryConfig::default());
        d.delivery
            .mint_session(DOC_ID, &client("192.0.2.1"))
            .unwrap()
            .session_id
    };

    let db = docshield::SqliteDatabase::open(dir.path().join("delivery.db")).unwrap();
    let log = docshield::AccessAuditLog::new(
        std::sync::Arc::new(docshield::audit::SqliteAuditBackend::new(std::sync::Arc::new(db))),
        std::sync::Arc::new(docshield::SystemClock),
    );
    let events = log.by_session(&session_id).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].action, AuditAction::NonceMint);
}
