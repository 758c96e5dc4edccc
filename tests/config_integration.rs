//! Loading server and stream configs from disk

mod common;

use common::gadgets::test_loader;
use reconstream::{Context, Loader, ServerConfig, Stream, StreamConfig, StreamError};
use std::io::Write;
use tempfile::NamedTempFile;

fn write_temp(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_server_config_with_workers_and_logging() {
    let file = write_temp(
        r#"
        port = 9100

        [logging]
        filter = "warn"

        [distribution]
        connect_timeout_ms = 250

        [[distribution.workers]]
        host = "10.0.0.1"
        port = 9002

        [[distribution.workers]]
        host = "10.0.0.2"
        port = 9002
        "#,
    );
    let config = ServerConfig::load(file.path()).unwrap();

    assert_eq!(config.port, 9100);
    assert_eq!(config.logging.filter, "warn");
    assert!(config.logging.directory.is_none());
    assert_eq!(config.distribution.workers.len(), 2);
    assert_eq!(config.distribution.workers[1].to_string(), "10.0.0.2:9002");
    assert_eq!(config.distribution.connect_timeout().as_millis(), 250);
}

#[test]
fn test_distributed_stream_needs_workers() {
    let file = write_temp(
        r#"
        key = "pipeline"

        [[nodes]]
        type = "distributed"
        name = "dist"
        distributor = { classname = "RoundRobinDistributor", properties = { channels = 2 } }

        [nodes.stream]
        key = "remote"
        [[nodes.stream.nodes]]
        type = "gadget"
        classname = "Shout"
        "#,
    );
    let config = StreamConfig::load(file.path()).unwrap();

    let err = Stream::new(&config, &Context::default(), &test_loader())
        .err()
        .unwrap();
    assert!(matches!(err, StreamError::Configuration(_)));
}

#[test]
fn test_missing_stream_config_is_a_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = StreamConfig::load(dir.path().join("missing.toml")).unwrap_err();
    assert!(matches!(err, StreamError::Configuration(_)));
}

#[test]
fn test_unknown_node_type_is_rejected() {
    let file = write_temp(
        r#"
        key = "pipeline"
        [[nodes]]
        type = "teleport"
        "#,
    );
    assert!(StreamConfig::load(file.path()).is_err());
}

#[test]
fn test_unknown_distributor_names_its_class() {
    let config = StreamConfig::from_toml_str(
        r#"
        key = "pipeline"
        [[nodes]]
        type = "distributed"
        name = "dist"
        distributor = { classname = "Scatter", dll = "libscatter.so" }
        [nodes.stream]
        key = "remote"
        "#,
    )
    .unwrap();
    let loader = Loader::default().with_distribution(reconstream::DistributionConfig::new(vec![
        reconstream::WorkerAddress::new("localhost", 9002),
    ]));

    let err = Stream::new(&config, &Context::default(), &loader)
        .err()
        .unwrap();
    let message = err.to_string();
    assert!(message.contains("Scatter"));
    assert!(message.contains("libscatter.so"));
}
