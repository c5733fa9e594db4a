// tests/shutdown.rs
#![cfg(unix)]

use std::time::Duration;

use keyword_news_bot::scheduler::shutdown_signal;

#[tokio::test]
async fn sigterm_resolves_shutdown_signal() {
    let waiter = tokio::spawn(shutdown_signal());
    // let the listener register before the signal is raised
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!waiter.is_finished());

    let status = std::process::Command::new("kill")
        .args(["-TERM", &std::process::id().to_string()])
        .status()
        .expect("kill");
    assert!(status.success());

    tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .expect("shutdown signal did not fire")
        .unwrap();
}
