//! Integration tests for the NDFD provider and the full pipeline using wiremock.
//!
//! These run the real HTTP client against a local mock server, so they cover
//! timeouts, status handling and the size limit end to end.

use std::time::Duration;

use kindle_weather_core::{
    FetchError, FileMode, IconAllowlist, Installer, OutputFormat, Pipeline, PipelineError,
    ProviderConfig, Renderer, Template, WeatherProvider, provider::ndfd::NdfdProvider,
};
use tempfile::TempDir;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path, query_param},
};

const FIXTURE: &str = include_str!("fixtures/ndfd_by_day.xml");
const ENDPOINT_PATH: &str = "/xml/SOAP_server/ndfdSOAPclientByDay.php";

fn provider_config(server: &MockServer) -> ProviderConfig {
    ProviderConfig {
        endpoint: format!("{}{ENDPOINT_PATH}", server.uri()),
        timeout_secs: 5,
        ..Default::default()
    }
}

fn create_test_provider(config: ProviderConfig) -> NdfdProvider {
    NdfdProvider::new_allowing_http(config).expect("Failed to create provider")
}

async fn setup_mock(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(ENDPOINT_PATH))
        .respond_with(response)
        .mount(server)
        .await;
}

fn pipeline_for(config: ProviderConfig, dir: &TempDir) -> Pipeline {
    Pipeline::new(
        Box::new(create_test_provider(config)),
        4,
        IconAllowlist::default(),
        Renderer::new(Template::builtin(), OutputFormat::Svg),
        Installer::new(dir.path().join("weather.svg"), FileMode::default()),
    )
}

// ============================================================================
// Provider
// ============================================================================

#[tokio::test]
async fn fetch_sends_ndfd_query_and_returns_body() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(ENDPOINT_PATH))
        .and(query_param("whichClient", "NDFDgenByDay"))
        .and(query_param("lat", "38.7197"))
        .and(query_param("lon", "-77.1546"))
        .and(query_param("format", "24 hourly"))
        .and(query_param("numDays", "4"))
        .and(query_param("Unit", "e"))
        .respond_with(ResponseTemplate::new(200).set_body_string(FIXTURE))
        .expect(1)
        .mount(&server)
        .await;

    let provider = create_test_provider(provider_config(&server));
    let body = provider.fetch_forecast().await.unwrap();

    assert_eq!(body, FIXTURE.as_bytes());
}

#[tokio::test]
async fn non_success_status_is_a_network_error() {
    let server = MockServer::start().await;
    setup_mock(&server, ResponseTemplate::new(503).set_body_string("down for maintenance")).await;

    let provider = create_test_provider(provider_config(&server));
    let err = provider.fetch_forecast().await.unwrap_err();

    match err {
        FetchError::Status { status, body } => {
            assert_eq!(status.as_u16(), 503);
            assert!(body.contains("maintenance"));
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn slow_provider_times_out() {
    let server = MockServer::start().await;
    setup_mock(
        &server,
        ResponseTemplate::new(200).set_body_string(FIXTURE).set_delay(Duration::from_secs(5)),
    )
    .await;

    let config = ProviderConfig { timeout_secs: 1, ..provider_config(&server) };
    let provider = create_test_provider(config);

    let err = provider.fetch_forecast().await.unwrap_err();
    assert!(matches!(err, FetchError::Timeout(d) if d == Duration::from_secs(1)), "got {err:?}");
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let server = MockServer::start().await;
    setup_mock(&server, ResponseTemplate::new(200).set_body_string("x".repeat(4096))).await;

    let config = ProviderConfig { max_body_bytes: 1024, ..provider_config(&server) };
    let provider = create_test_provider(config);

    let err = provider.fetch_forecast().await.unwrap_err();
    assert!(matches!(err, FetchError::BodyTooLarge { limit: 1024 }), "got {err:?}");
}

#[tokio::test]
async fn unreachable_server_is_a_request_error() {
    let server = MockServer::start().await;
    let config = provider_config(&server);
    drop(server);

    let provider = create_test_provider(config);
    let err = provider.fetch_forecast().await.unwrap_err();
    assert!(matches!(err, FetchError::Request(_)), "got {err:?}");
}

// ============================================================================
// Full pipeline
// ============================================================================

#[tokio::test]
async fn pipeline_installs_rendered_forecast() {
    let server = MockServer::start().await;
    setup_mock(&server, ResponseTemplate::new(200).set_body_string(FIXTURE)).await;
    let dir = TempDir::new().unwrap();

    let report = pipeline_for(provider_config(&server), &dir).run().await.unwrap();

    let svg = std::fs::read_to_string(&report.destination).unwrap();
    assert!(svg.contains("72°F"));
    assert!(svg.contains(r##"xlink:href="#sct""##));
    assert!(svg.contains(">Wednesday<"));
}

#[tokio::test]
async fn pipeline_rejects_external_entities_without_writing() {
    let server = MockServer::start().await;
    let hostile = FIXTURE.replacen(
        "<dwml",
        "<!DOCTYPE dwml [<!ENTITY xxe SYSTEM \"file:///etc/passwd\">]>\n<dwml",
        1,
    );
    setup_mock(&server, ResponseTemplate::new(200).set_body_string(hostile)).await;
    let dir = TempDir::new().unwrap();

    let err = pipeline_for(provider_config(&server), &dir).run().await.unwrap_err();

    assert!(matches!(err, PipelineError::Parse(_)), "got {err:?}");
    assert!(!dir.path().join("weather.svg").exists());
}

#[tokio::test]
async fn pipeline_timeout_exits_non_zero_without_writing() {
    let server = MockServer::start().await;
    setup_mock(
        &server,
        ResponseTemplate::new(200).set_body_string(FIXTURE).set_delay(Duration::from_secs(5)),
    )
    .await;
    let dir = TempDir::new().unwrap();
    let config = ProviderConfig { timeout_secs: 1, ..provider_config(&server) };

    let err = pipeline_for(config, &dir).run().await.unwrap_err();

    assert_eq!(err.exit_code(), 3);
    assert!(!dir.path().join("weather.svg").exists());
}

#[tokio::test]
async fn identical_feeds_produce_identical_files() {
    let server = MockServer::start().await;
    setup_mock(&server, ResponseTemplate::new(200).set_body_string(FIXTURE)).await;
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline_for(provider_config(&server), &dir);

    let first = pipeline.run().await.unwrap();
    let first_bytes = std::fs::read(&first.destination).unwrap();
    let second = pipeline.run().await.unwrap();
    let second_bytes = std::fs::read(&second.destination).unwrap();

    assert_eq!(first_bytes, second_bytes);
}
