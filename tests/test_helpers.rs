//! Test helpers and utilities for integration tests

use cmdconfirm::config::ClientConfig;
use cmdconfirm::session::Session;
use cmdconfirm::testing::MockTransport;

/// Configuration with short timeouts so a session can be driven quickly
#[allow(dead_code)]
pub fn test_config() -> ClientConfig {
    let mut config = ClientConfig::for_broker("mqtt://localhost:1883");
    config.broker.client_id = "test-consumer".to_string();
    config.broker.command_timeout_ms = 200;
    config.session.pump_timeout_ms = 20;
    config.session.idle_delay_ms = 0;
    config
}

/// Session over a fresh mock transport
#[allow(dead_code)]
pub fn mock_session() -> Session<MockTransport> {
    session_over(MockTransport::new())
}

#[allow(dead_code)]
pub fn session_over(transport: MockTransport) -> Session<MockTransport> {
    Session::with_transport(transport, &test_config()).unwrap()
}

/// Run the session loop until the mock has nothing left to deliver
#[allow(dead_code)]
pub async fn drain(session: &mut Session<MockTransport>) {
    for _ in 0..20 {
        if session.gateway().transport().queued_events() == 0 {
            break;
        }
        session.run_once().await;
    }
}
