mod common;

use common::FakeProvider;
use xo_templates::image::ProviderRegistry;
use xo_templates::models::{template_name, Architecture, BootOrder, TemplateList, TemplateRecord};
use xo_templates::{Config, Error};

const CONFIG_YAML: &str = r#"
templates:
  debian-12:
    source:
      distribution: Debian
      architecture: amd64
      version: 12
      variant: genericcloud
      base_template: Debian Bookworm 12
    target:
      name: debian-12
      cpu: 2
      memory: 4
      network: Pool-wide network associated with eth0
      sr: Local storage
  ubuntu-24:
    source:
      distribution: ubuntu
      architecture: amd64
      version: "24.04"
      variant: live-server
      base_template: Ubuntu Noble Numbat 24.04
    target:
      name: ubuntu-24
      cpu: 4
      memory: 8
      network: Pool-wide network associated with eth0
      sr: Local storage
"#;

fn registry() -> ProviderRegistry {
    ProviderRegistry::new()
        .register("debian", FakeProvider::new())
        .register("ubuntu", FakeProvider::new())
}

#[test]
fn test_boot_order_accepts_device_letters() {
    for order in ["cd", "dn", "cdn", "c", "n"] {
        let parsed = BootOrder::parse(order).unwrap();
        assert_eq!(parsed.as_str(), order);
    }
    assert_eq!(BootOrder::disk_then_optical().as_str(), "cd");
}

#[test]
fn test_boot_order_rejects_anything_else() {
    for order in ["", "cx", "CD", "c d", "hdd"] {
        match BootOrder::parse(order) {
            Err(Error::InvalidBootOrder(value)) => assert_eq!(value, order),
            other => panic!("Expected InvalidBootOrder for '{}', got {:?}", order, other),
        }
    }
    assert!("dnx".parse::<BootOrder>().is_err());
}

#[test]
fn test_template_list_preserves_file_order() {
    let specs = TemplateList::from_yaml(CONFIG_YAML)
        .unwrap()
        .into_validated(&registry())
        .unwrap();

    assert_eq!(specs.len(), 2);
    assert_eq!(specs[0].target.name, "debian-12");
    assert_eq!(specs[0].source.distribution, "debian");
    assert_eq!(specs[0].source.version, "12");
    assert_eq!(specs[0].source.architecture, Architecture::Amd64);
    assert_eq!(specs[1].target.name, "ubuntu-24");
    assert_eq!(specs[1].source.version, "24.04");
    assert_eq!(specs[1].target.memory, 8);
}

#[test]
fn test_unsupported_distribution_is_rejected() {
    let yaml = CONFIG_YAML.replace("distribution: ubuntu", "distribution: fedora");
    let error = TemplateList::from_yaml(&yaml)
        .unwrap()
        .into_validated(&registry())
        .unwrap_err();

    match error {
        Error::Configuration(message) => {
            assert!(message.contains("template 'ubuntu-24'"), "{}", message);
            assert!(message.contains("Unsupported distribution: fedora"), "{}", message);
            assert!(message.contains("debian, ubuntu"), "{}", message);
        }
        other => panic!("Expected Configuration error, got {:?}", other),
    }
}

#[test]
fn test_zero_cpu_is_rejected() {
    let yaml = CONFIG_YAML.replace("cpu: 2", "cpu: 0");
    let error = TemplateList::from_yaml(&yaml)
        .unwrap()
        .into_validated(&registry())
        .unwrap_err();
    assert!(error.to_string().contains("cpu must be at least 1"));
}

#[test]
fn test_malformed_yaml_is_a_configuration_error() {
    let error = TemplateList::from_yaml("templates: [not, a, map]").unwrap_err();
    assert!(matches!(error, Error::Configuration(_)));
}

#[test]
fn test_template_record_from_object() {
    let object = serde_json::json!({
        "id": "0f6c",
        "uuid": "0f6c-uuid",
        "name_label": "template.debian-12.1700000000",
        "CPUs": { "number": 2, "max": 4 },
        "memory": { "size": 4294967296u64 },
        "tags": ["template.debian-12"]
    });
    let record: TemplateRecord = serde_json::from_value(object).unwrap();

    assert_eq!(record.cpu_count(), Some(2));
    assert_eq!(record.memory_gb(), 4.0);
    assert_eq!(record.build_id(), Some(1_700_000_000));
    assert_eq!(template_name("debian-12", 1_700_000_000), record.name_label);

    let bare: TemplateRecord = serde_json::from_value(serde_json::json!({ "name_label": "Other install media" })).unwrap();
    assert_eq!(bare.cpu_count(), None);
    assert_eq!(bare.memory_gb(), 0.0);
    assert_eq!(bare.build_id(), None);
}

#[test]
fn test_config_urls() {
    let config = Config::with_credentials("wss://xoa.example.com/", "token");
    assert_eq!(config.url, "wss://xoa.example.com");
    assert_eq!(config.rpc_url(), "wss://xoa.example.com/api/");
    assert_eq!(config.http_base_url(), "https://xoa.example.com");

    let plain = Config::with_credentials("ws://10.0.0.5:8080", "token");
    assert_eq!(plain.http_base_url(), "http://10.0.0.5:8080");

    let https = Config::with_credentials("https://xoa.example.com", "token");
    assert_eq!(https.http_base_url(), "https://xoa.example.com");
}

#[test]
fn test_http_url_maps_to_websocket_endpoint() {
    let https = Config::with_credentials("https://xoa.example.com", "token");
    assert_eq!(https.rpc_url(), "wss://xoa.example.com/api/");

    let http = Config::with_credentials("http://10.0.0.5:8080/", "token");
    assert_eq!(http.rpc_url(), "ws://10.0.0.5:8080/api/");
    assert_eq!(http.http_base_url(), "http://10.0.0.5:8080");
}

#[test]
fn test_config_builder_clamps_concurrency() {
    let config = Config::with_credentials("wss://xoa", "token")
        .concurrency(0)
        .timeout_seconds(30)
        .use_cache(false);
    assert_eq!(config.concurrency, 1);
    assert_eq!(config.timeout_seconds, 30);
    assert!(!config.use_cache);
}

#[test]
fn test_config_requires_credentials() {
    std::env::remove_var("XOA_URL");
    std::env::remove_var("XOA_TOKEN");
    match Config::new() {
        Err(Error::MissingCredentials) => (),
        other => panic!("Expected MissingCredentials, got {:?}", other.map(|c| c.url)),
    }
}
