mod common;

use common::{Call, FakeDriver, ScriptedModel, test_config};
use intent_agent::analyze_page;

#[tokio::test]
async fn analysis_sees_captured_page() {
    let model = ScriptedModel::new(&[]).analysis("  A checkout form with an email field.\n");
    let driver = FakeDriver::new(&[]);

    let analysis = analyze_page(&model, &test_config(), &driver).await.unwrap();

    assert_eq!(analysis, "A checkout form with an email field.");
    let prompts = model.prompts(Call::Analyze);
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("- Title: Checkout"));
    assert!(prompts[0].contains(r#"<button id="place-order">"#));
}

#[tokio::test]
async fn analysis_fails_when_page_is_unreadable() {
    let model = ScriptedModel::new(&[]);
    let driver = FakeDriver::new(&[]).failing_source();

    assert!(analyze_page(&model, &test_config(), &driver).await.is_err());
    assert_eq!(model.count(Call::Analyze), 0);
}
