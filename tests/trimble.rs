//! Trimble 5500 sessions over a scripted register dialogue.

use rust_survey::adapters::{MockReply, MockTransport, SentLog};
use rust_survey::error_recovery::RetryPolicy;
use rust_survey::instrument::{EdmProgram, InstrumentModel};
use rust_survey::TotalStation;

fn trimble(replies: &[&str]) -> (TotalStation, SentLog) {
    let transport = MockTransport::scripted(replies.iter().map(|r| MockReply::line(*r)));
    let log = transport.sent_log();
    let ts = TotalStation::new(
        "trimble",
        InstrumentModel::Trimble5500.build(),
        Box::new(transport),
    )
    .with_poll_policy(RetryPolicy::new(3, std::time::Duration::ZERO));
    (ts, log)
}

#[tokio::test]
async fn test_measurement_polled_until_distance() {
    let (mut ts, log) = trimble(&[
        ">",
        "7=10.0000\n8=90.0000>",
        "7=10.0000\n8=90.0000\n9=25.125>",
        "4=ABC\n5=P12\n7=10.3000\n8=89.3000\n9=31.500>",
    ]);
    ts.open().await.unwrap();

    ts.measure(EdmProgram::Default, 0).await.unwrap();
    let polled = ts.get_measure_polled(1000, 0).await.unwrap();
    assert!(polled.satisfied);
    assert_eq!(polled.attempts, 2);
    assert_eq!(polled.value.distance, Some(25.125));

    // point code and number registers are text
    let m = ts.get_measure(1000, 0).await.unwrap();
    assert_eq!(m.distance, Some(31.5));
    assert!((m.hz.unwrap().deg() - 10.5).abs() < 1e-9);
    assert!((m.v.unwrap().deg() - 89.5).abs() < 1e-9);

    assert_eq!(log.lines(), ["TG", "RG", "RG", "RG"]);
    assert!(ts.state().is_ok());
}

#[tokio::test]
async fn test_measurement_without_distance_hits_ceiling() {
    let (mut ts, log) = trimble(&["7=10.0000>", "7=10.0000>", "7=10.0000>"]);
    ts.open().await.unwrap();

    let polled = ts.get_measure_polled(1000, 0).await.unwrap();
    assert!(!polled.satisfied);
    assert_eq!(polled.attempts, 3);
    assert_eq!(polled.value.distance, None);
    assert_eq!(log.count_prefix("RG"), 3);
}

#[tokio::test]
async fn test_change_face_is_synthesized() {
    let (mut ts, log) = trimble(&["7=50.0000>", "8=80.0000>", ">", ">", ">"]);
    ts.open().await.unwrap();

    ts.change_face().await.unwrap();

    assert_eq!(
        log.lines(),
        ["RG,7", "RG,8", "WG,26=280.0000", "WG,27=230.0000", "WS=PH02V02"]
    );
}
