//! Demo tenant for local runs.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use relance_core::channels::OutreachChannel;
use relance_core::types::{
    Campaign, CampaignStep, CampaignTrigger, Document, Extraction, Line,
};
use relance_store::memory::InMemoryStore;

/// Inserts one campaign and three open lines for a single client. Returns
/// the receipts that "arrive" after the first reminder.
pub fn seed(store: &InMemoryStore, now: DateTime<Utc>) -> Vec<Document> {
    let tenant_id = Uuid::new_v4();
    let client_id = Uuid::new_v4();

    store.insert_campaign(Campaign {
        id: Uuid::new_v4(),
        tenant_id,
        name: "Justificatifs manquants".to_string(),
        trigger: CampaignTrigger::OnLinePending,
        is_active: true,
        quiet_hours: true,
        steps: vec![
            CampaignStep {
                order: 1,
                delay_hours: 0,
                channel: OutreachChannel::Message,
                template_id: "missing_receipt".to_string(),
                config: serde_json::json!({
                    "body": "Bonjour, il nous manque des justificatifs sur votre compte."
                }),
            },
            CampaignStep {
                order: 2,
                delay_hours: 48,
                channel: OutreachChannel::Notification,
                template_id: "missing_receipt_push".to_string(),
                config: serde_json::json!({ "title": "Justificatifs en attente" }),
            },
            CampaignStep {
                order: 3,
                delay_hours: 72,
                channel: OutreachChannel::Voice,
                template_id: "missing_receipt_call".to_string(),
                config: serde_json::json!({}),
            },
        ],
        created_at: now,
        updated_at: now,
    });

    let today = now.date_naive();
    let lines = [
        (Decimal::new(4200, 2), 6, "CB AMAZON PAYMENTS 0312"),
        (Decimal::new(1999, 2), 10, "PRLV FREE TELECOM"),
        (Decimal::new(12850, 2), 3, "CB LEROY MERLIN 1203"),
    ];
    for (amount, days_ago, label) in lines {
        store.insert_line(Line::new(
            tenant_id,
            Some(client_id),
            amount,
            today - Duration::days(days_ago),
            label,
            now,
        ));
    }

    let receipt = Document::from_extraction(
        "facture-amazon.pdf",
        Extraction {
            client_id: Some(client_id),
            amount: Some(Decimal::new(4200, 2)),
            date: Some(today - Duration::days(6)),
            vendor: Some("Amazon Marketplace".to_string()),
        },
        now,
    );
    store.insert_document(receipt.clone());
    vec![receipt]
}
