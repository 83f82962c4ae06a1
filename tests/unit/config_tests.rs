use std::time::Duration;

use metagraph_monitor::config::GlobalConfig;
use metagraph_monitor::models::layer::Layer;
use metagraph_monitor::AppError;

fn sample_toml() -> String {
    r#"
[monitor]
interval_seconds = 120
snapshot_staleness_seconds = 600
command_timeout_seconds = 60
http_timeout_seconds = 10
ipc_name = "mg-monitor"

[network]
name = "integrationnet"
load_balancer_url = "https://l0-lb.example.com"
block_explorer_url = "https://be.example.com"

[slack]
channel_id = "C123"

[metagraph]
id = "DAG0metagraphtoken"
name = "example"

[metagraph.layers.ml0]
public_port = 7000
p2p_port = 7001
cli_port = 7002
jvm_args = ["-Xmx8g"]

[metagraph.layers.cl1]
public_port = 8000
p2p_port = 8001
cli_port = 8002
directory = "/opt/cl1"
jar = "cl1.jar"
seedlist_url = "https://example.com/seedlist"

[metagraph.layers.cl1.additional_env]
CL_EXTRA = "yes"

[metagraph.layers.dl1]
ignore = true
public_port = 9000
p2p_port = 9001
cli_port = 9002

[[metagraph.nodes]]
name = "alpha"
ip = "10.1.0.1"
ssh_key_file = "/keys/alpha"

[metagraph.nodes.keys.ml0]
file = "ml0.p12"
alias = "ml0"
password = "pw-ml0"

[metagraph.nodes.keys.cl1]
file = "cl1.p12"
alias = "cl1"
password = "pw-cl1"

[[metagraph.nodes]]
name = "beta"
ip = "10.1.0.2"
ssh_user = "ubuntu"
ssh_port = 2222
ssh_key_file = "/keys/beta"

[metagraph.nodes.keys.ml0]
file = "ml0.p12"
alias = "ml0"
password = "pw-ml0"

[metagraph.nodes.keys.cl1]
file = "cl1.p12"
alias = "cl1"
password = "pw-cl1"
"#
    .to_owned()
}

fn minimal_toml() -> String {
    r#"
[network]

[metagraph]
id = "DAG0metagraphtoken"
name = "example"

[metagraph.layers.ml0]
public_port = 7000
p2p_port = 7001
cli_port = 7002

[[metagraph.nodes]]
name = "alpha"
ip = "10.1.0.1"
ssh_key_file = "/keys/alpha"

[metagraph.nodes.keys.ml0]
file = "ml0.p12"
alias = "ml0"
password = "pw"
"#
    .to_owned()
}

fn expect_config_error(toml: &str, needle: &str) {
    match GlobalConfig::from_toml_str(toml) {
        Err(AppError::Config(msg)) => {
            assert!(msg.contains(needle), "expected '{needle}' in: {msg}");
        }
        Err(other) => panic!("expected config error, got {other}"),
        Ok(_) => panic!("expected config error containing '{needle}'"),
    }
}

#[test]
fn parses_full_config() {
    let config = GlobalConfig::from_toml_str(&sample_toml()).expect("config parses");

    assert_eq!(config.cycle_interval(), Duration::from_secs(120));
    assert_eq!(config.staleness_threshold(), Duration::from_secs(600));
    assert_eq!(config.command_timeout(), Duration::from_secs(60));
    assert_eq!(config.http_timeout(), Duration::from_secs(10));
    assert_eq!(config.monitor.ipc_name, "mg-monitor");
    assert_eq!(config.network.name, "integrationnet");
    assert_eq!(config.slack.channel_id, "C123");
    assert!(config.slack.bot_token.is_empty());

    let cl1 = config.layer(Layer::CurrencyL1).expect("cl1 configured");
    assert_eq!(cl1.directory(Layer::CurrencyL1), "/opt/cl1");
    assert_eq!(cl1.jar(Layer::CurrencyL1), "cl1.jar");
    assert_eq!(cl1.additional_env["CL_EXTRA"], "yes");

    let beta = config.host("beta").expect("beta configured");
    assert_eq!(beta.ssh_user, "ubuntu");
    assert_eq!(beta.ssh_port, 2222);
}

#[test]
fn ignored_layers_are_not_active() {
    let config = GlobalConfig::from_toml_str(&sample_toml()).expect("config parses");
    assert_eq!(
        config.active_layers(),
        vec![Layer::MetagraphL0, Layer::CurrencyL1]
    );
}

#[test]
fn minimal_config_uses_defaults() {
    let config = GlobalConfig::from_toml_str(&minimal_toml()).expect("config parses");

    assert_eq!(config.cycle_interval(), Duration::from_secs(300));
    assert_eq!(config.staleness_threshold(), Duration::from_secs(240));
    assert_eq!(config.monitor.ipc_name, "metagraph-monitor");
    assert_eq!(config.network.name, "mainnet");
    assert!(config.network.reference_nodes.is_empty());
    assert!(config.slack.channel_id.is_empty());
    assert_eq!(config.active_layers(), vec![Layer::MetagraphL0]);

    let ml0 = config.layer(Layer::MetagraphL0).expect("ml0 configured");
    assert_eq!(ml0.directory(Layer::MetagraphL0), "code/metagraph-l0");
    assert_eq!(ml0.jar(Layer::MetagraphL0), "metagraph-l0.jar");

    let alpha = config.host("alpha").expect("alpha configured");
    assert_eq!(alpha.ssh_user, "root");
    assert_eq!(alpha.ssh_port, 22);
}

#[test]
fn unknown_host_lookup_fails() {
    let config = GlobalConfig::from_toml_str(&minimal_toml()).expect("config parses");
    assert!(matches!(config.host("gamma"), Err(AppError::NotFound(_))));
    assert!(matches!(
        config.require_layer(Layer::DataL1),
        Err(AppError::NotFound(_))
    ));
}

#[test]
fn load_from_path_reads_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");
    std::fs::write(&path, minimal_toml()).expect("write config");

    let config = GlobalConfig::load_from_path(&path).expect("config loads");
    assert_eq!(config.metagraph.name, "example");
}

#[test]
fn missing_file_is_a_config_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let result = GlobalConfig::load_from_path(dir.path().join("absent.toml"));
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn invalid_toml_is_rejected() {
    expect_config_error("[metagraph", "invalid config");
}

#[test]
fn zero_interval_is_rejected() {
    let toml = format!("[monitor]\ninterval_seconds = 0\n{}", minimal_toml());
    expect_config_error(&toml, "interval_seconds");
}

#[test]
fn zero_staleness_is_rejected() {
    let toml = format!("[monitor]\nsnapshot_staleness_seconds = 0\n{}", minimal_toml());
    expect_config_error(&toml, "snapshot_staleness_seconds");
}

#[test]
fn zero_timeout_is_rejected() {
    let toml = format!("[monitor]\nhttp_timeout_seconds = 0\n{}", minimal_toml());
    expect_config_error(&toml, "timeouts");
}

#[test]
fn empty_metagraph_id_is_rejected() {
    let toml = minimal_toml().replace("id = \"DAG0metagraphtoken\"", "id = \"  \"");
    expect_config_error(&toml, "metagraph.id");
}

#[test]
fn ignored_base_layer_is_rejected() {
    let toml = minimal_toml().replace(
        "[metagraph.layers.ml0]\n",
        "[metagraph.layers.ml0]\nignore = true\n",
    );
    expect_config_error(&toml, "ml0 layer cannot be ignored");
}

#[test]
fn duplicate_host_names_are_rejected() {
    let toml = sample_toml().replace("name = \"beta\"", "name = \"alpha\"");
    expect_config_error(&toml, "duplicate host name");
}

#[test]
fn duplicate_host_ips_are_rejected() {
    let toml = sample_toml().replace("10.1.0.2", "10.1.0.1");
    expect_config_error(&toml, "duplicate host ip");
}

#[test]
fn repeated_ports_are_rejected() {
    let toml = minimal_toml().replace("cli_port = 7002", "cli_port = 7001");
    expect_config_error(&toml, "distinct");
}

#[test]
fn zero_port_is_rejected() {
    let toml = minimal_toml().replace("public_port = 7000", "public_port = 0");
    expect_config_error(&toml, "non-zero");
}

#[test]
fn missing_key_material_for_active_layer_is_rejected() {
    let toml = format!(
        "{}\n[metagraph.layers.cl1]\npublic_port = 8000\np2p_port = 8001\ncli_port = 8002\n",
        minimal_toml()
    );
    expect_config_error(&toml, "no key material for layer cl1");
}

#[test]
fn ignored_layer_needs_no_key_material() {
    let toml = format!(
        "{}\n[metagraph.layers.dl1]\nignore = true\npublic_port = 9000\np2p_port = 9001\ncli_port = 9002\n",
        minimal_toml()
    );
    let config = GlobalConfig::from_toml_str(&toml).expect("config parses");
    assert_eq!(config.active_layers(), vec![Layer::MetagraphL0]);
}

#[test]
fn no_hosts_is_rejected() {
    let toml = r#"
[network]

[metagraph]
id = "DAG0metagraphtoken"
name = "example"
nodes = []

[metagraph.layers.ml0]
public_port = 7000
p2p_port = 7001
cli_port = 7002
"#;
    expect_config_error(toml, "at least one host");
}
