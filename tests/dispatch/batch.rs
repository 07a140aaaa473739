use bulkmail::dispatch::DispatchConfig;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::method;
use wiremock::matchers::path;
use wiremock::Mock;
use wiremock::ResponseTemplate;

use crate::helpers::campaign_with;
use crate::helpers::dispatcher;
use crate::helpers::quick_config;
use crate::helpers::spawn_provider;

fn batch_config(batch_size: usize) -> DispatchConfig {
    DispatchConfig {
        batch_mode: true,
        batch_size,
        ..quick_config()
    }
}

#[tokio::test]
async fn two_hundred_fifty_recipients_make_exactly_three_batches() {
    let provider = spawn_provider().await;
    Mock::given(method("POST"))
        .and(path("/email/batch"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .expect(3)
        .mount(&provider)
        .await;

    let campaign = campaign_with(250);
    let results = dispatcher(&provider, batch_config(100))
        .dispatch(&campaign, CancellationToken::new())
        .await;

    assert_eq!(results.len(), 250);
    assert!(results.iter().all(|r| r.success));

    // chunk sizes are 100, 100, 50
    let requests = provider.received_requests().await.unwrap();
    let sizes: Vec<usize> = requests
        .iter()
        .map(|r| r.body_json::<serde_json::Value>().unwrap().as_array().unwrap().len())
        .collect();
    assert_eq!(sizes, vec![100, 100, 50]);
}

#[tokio::test]
async fn chunk_failure_marks_every_recipient_in_that_chunk() {
    let provider = spawn_provider().await;

    // first chunk rejected, the rest accepted; chunk-level errors get no
    // retry
    Mock::given(method("POST"))
        .and(path("/email/batch"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .expect(1)
        .named("rejected first chunk")
        .mount(&provider)
        .await;
    Mock::given(method("POST"))
        .and(path("/email/batch"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .expect(2)
        .mount(&provider)
        .await;

    let campaign = campaign_with(5);
    let results = dispatcher(&provider, batch_config(2))
        .dispatch(&campaign, CancellationToken::new())
        .await;

    assert_eq!(results.len(), 5);

    let failed: Vec<_> = results.iter().filter(|r| !r.success).collect();
    assert_eq!(failed.len(), 2);
    // every recipient of the failed chunk carries the same error message
    assert_eq!(failed[0].error, failed[1].error);
    assert!(failed[0]
        .error
        .as_deref()
        .unwrap()
        .contains("server error: status 500"));

    assert_eq!(results.iter().filter(|r| r.success).count(), 3);
}

#[tokio::test]
async fn provider_accepted_count_does_not_require_message_ids() {
    let provider = spawn_provider().await;
    Mock::given(method("POST"))
        .and(path("/email/batch"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "Accepted": 4 })))
        .expect(1)
        .mount(&provider)
        .await;

    let campaign = campaign_with(4);
    let results = dispatcher(&provider, batch_config(100))
        .dispatch(&campaign, CancellationToken::new())
        .await;

    assert_eq!(results.len(), 4);
    assert!(results.iter().all(|r| r.success));
    assert!(results.iter().all(|r| r.provider_message_id.is_none()));
}

#[tokio::test]
async fn cancelled_batch_dispatch_returns_partial_results() {
    let provider = spawn_provider().await;
    Mock::given(method("POST"))
        .and(path("/email/batch"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .expect(0)
        .mount(&provider)
        .await;

    let cancel = CancellationToken::new();
    cancel.cancel();

    let campaign = campaign_with(10);
    let results = dispatcher(&provider, batch_config(3))
        .dispatch(&campaign, cancel)
        .await;

    assert!(results.is_empty());
}
