//! Unit Tests for Configuration Module
//!
//! Tests configuration loading, validation and CLI overrides

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use lib_coordinator::DeviceClass;
use lib_types::{DevAddr, DevEui, GatewayId, NetId};
use lns::config::{load_configuration, CliArgs, ConfigError};
use lns::runtime::NodeRuntime;
use tempfile::TempDir;

const DEVICES: &str = r#"
gateway_id = "gw-site-1"

[coordinator]
net_id = "000013"
preferred_gateway_receive_interval = "150ms"

[packet_forwarder]
command = "/opt/lora/station"
args = ["--home", "/opt/lora"]

[[devices]]
dev_eui = "0004A30B001C0530"
join_eui = "70B3D57ED0000001"
app_key = "00112233445566778899AABBCCDDEEFF"
class = "C"

[[devices]]
dev_eui = "0004A30B001C0531"
join_eui = "70B3D57ED0000001"
home_gateway = "gw-site-1"

[devices.session]
dev_addr = "02031980"
nwk_s_key = "263CBE4C30C062D18D992A0A4977C4C6"
app_s_key = "9CFE0558729EFAE33960F56EE855E706"
"#;

fn write_config(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("node.toml");
    std::fs::write(&path, content).unwrap();
    path
}

fn args(path: &Path) -> CliArgs {
    CliArgs {
        config: path.to_path_buf(),
        ..CliArgs::default()
    }
}

#[tokio::test]
async fn test_full_configuration() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = write_config(&temp_dir, DEVICES);

    let config = load_configuration(&args(&path)).await?;

    assert_eq!(config.gateway_id, GatewayId::from("gw-site-1"));
    assert_eq!(config.log_level, "info");
    assert_eq!(config.coordinator.net_id, NetId(0x13));
    assert_eq!(
        config.coordinator.preferred_gateway_receive_interval,
        Duration::from_millis(150)
    );
    assert_eq!(config.cache.lock_wait_timeout, Duration::from_secs(30));

    let forwarder = config.packet_forwarder.as_ref().unwrap();
    assert_eq!(forwarder.args, vec!["--home", "/opt/lora"]);
    assert_eq!(forwarder.restart_delay, Duration::from_secs(5));
    assert!(forwarder.restart);

    assert_eq!(config.devices.len(), 2);
    let otaa = &config.devices[0];
    assert_eq!(otaa.dev_eui, DevEui(0x0004_A30B_001C_0530));
    assert_eq!(otaa.class, DeviceClass::C);
    assert!(otaa.uses_preferred_gateway());

    let abp = &config.devices[1];
    assert!(!abp.uses_preferred_gateway());
    assert_eq!(abp.session.as_ref().unwrap().dev_addr, DevAddr(0x0203_1980));

    Ok(())
}

#[tokio::test]
async fn test_cli_overrides() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = write_config(&temp_dir, DEVICES);

    let cli = CliArgs {
        config: path,
        gateway_id: Some("gw-override".to_string()),
        log_level: Some("debug".to_string()),
    };
    let config = load_configuration(&cli).await?;

    assert_eq!(config.gateway_id, GatewayId::from("gw-override"));
    assert_eq!(config.log_level, "debug");
    Ok(())
}

#[test]
fn test_startup_log_level() {
    assert_eq!(CliArgs::default().startup_log_level(), "info");

    let cli = CliArgs {
        log_level: Some("lns=debug".to_string()),
        ..CliArgs::default()
    };
    assert_eq!(cli.startup_log_level(), "lns=debug");
}

#[tokio::test]
async fn test_empty_file_uses_defaults() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = write_config(&temp_dir, "");

    let config = load_configuration(&args(&path)).await?;
    assert_eq!(config.gateway_id, GatewayId::from("gateway-0"));
    assert!(config.devices.is_empty());
    assert!(config.packet_forwarder.is_none());
    Ok(())
}

#[tokio::test]
async fn test_missing_file() {
    let temp_dir = TempDir::new().unwrap();
    let err = load_configuration(&args(&temp_dir.path().join("nonexistent.toml")))
        .await
        .unwrap_err();
    assert!(matches!(err, ConfigError::Missing(_)));
}

#[tokio::test]
async fn test_malformed_identifier_is_a_parse_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_config(
        &temp_dir,
        r#"
[[devices]]
dev_eui = "0004A30B"
join_eui = "70B3D57ED0000001"
app_key = "00112233445566778899AABBCCDDEEFF"
"#,
    );

    let err = load_configuration(&args(&path)).await.unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
}

#[tokio::test]
async fn test_device_without_keys_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_config(
        &temp_dir,
        r#"
[[devices]]
dev_eui = "0004A30B001C0530"
join_eui = "70B3D57ED0000001"
"#,
    );

    let err = load_configuration(&args(&path)).await.unwrap_err();
    let ConfigError::InvalidDevice { dev_eui, .. } = err else {
        panic!("expected an invalid device error, got {err}");
    };
    assert_eq!(dev_eui, DevEui(0x0004_A30B_001C_0530));
}

#[tokio::test]
async fn test_duplicate_device_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let device = r#"
[[devices]]
dev_eui = "0004A30B001C0530"
join_eui = "70B3D57ED0000001"
app_key = "00112233445566778899AABBCCDDEEFF"
"#;
    let path = write_config(&temp_dir, &format!("{device}{device}"));

    let err = load_configuration(&args(&path)).await.unwrap_err();
    assert!(matches!(err, ConfigError::InvalidDevice { .. }));
}

#[tokio::test]
async fn test_empty_gateway_override_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_config(&temp_dir, DEVICES);

    let cli = CliArgs {
        config: path,
        gateway_id: Some("  ".to_string()),
        log_level: None,
    };
    let err = load_configuration(&cli).await.unwrap_err();
    assert!(matches!(err, ConfigError::EmptyGatewayId));
}

#[tokio::test]
async fn test_joined_session_is_stored() -> Result<()> {
    use lib_coordinator::DownlinkDecision;
    use lib_network::{DataFrame, FCtrl, FOpts, FramePayload, JoinRequest, MType};
    use lib_types::conversion::bytes_to_hex;
    use lib_types::{AppKey, DevNonce, JoinEui};
    use lns::runtime::ReplayLine;

    let temp_dir = TempDir::new()?;
    let path = write_config(
        &temp_dir,
        r#"
gateway_id = "gw-1"

[[devices]]
dev_eui = "0004A30B001C0530"
join_eui = "70B3D57ED0000001"
app_key = "00112233445566778899AABBCCDDEEFF"
fixed_dev_addr = "26011BDA"
"#,
    );
    let config = load_configuration(&args(&path)).await?;
    let runtime = NodeRuntime::new(&config);
    let gw = GatewayId::from("gw-1");

    let app_key: AppKey = "00112233445566778899AABBCCDDEEFF".parse()?;
    let join = JoinRequest::new(
        JoinEui(0x70B3_D57E_D000_0001),
        DevEui(0x0004_A30B_001C_0530),
        DevNonce(0x0001),
        &app_key,
    );
    let join_line = ReplayLine::parse(&format!("- -50 {}", bytes_to_hex(&join.encode())), &gw)?.unwrap();

    let DownlinkDecision::JoinAccepted { session, .. } = runtime.process(&join_line).await? else {
        panic!("expected a join accept");
    };
    assert_eq!(session.dev_addr, DevAddr(0x2601_1BDA));

    // Uplinks under the new session now authenticate
    let uplink = DataFrame::build(
        MType::UnconfirmedDataUp,
        session.dev_addr,
        FCtrl::default(),
        1,
        FOpts::empty(),
        FramePayload::Application { fport: 1, data: vec![0xAB] },
        &session.keys,
    )?;
    let line = format!("- -50 {}\n", bytes_to_hex(&uplink.encode()?));
    let mut output = Vec::new();
    let stats = runtime.replay(line.as_bytes(), &mut output).await?;
    assert_eq!(stats.accepted, 1);
    assert!(String::from_utf8(output)?.contains(r#""data":"AB""#));

    Ok(())
}
