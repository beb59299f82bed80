//! Decoding and encoding of whole compose documents

use super::config::ComposeConfig;
use super::node::Node;
use crate::error::{ComposeError, Result};
use serde_yaml::Value;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

// Stand-in scalar for a healthcheck test while the YAML emitter runs; it is
// swapped for the flow sequence afterwards. Lengthened with `_` until it
// occurs nowhere in the document's own text.
const FLOW_PLACEHOLDER: &str = "__rune_compose_flow_sequence_";

/// Textual encodings of a compose document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// Indentation-based YAML
    Yaml,
    /// Brace-delimited JSON
    Json,
}

impl Format {
    /// Select the format from a path's suffix
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| ComposeError::UnsupportedFormat(path.display().to_string()))?;
        extension.parse()
    }

    /// Canonical file extension, without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            Format::Yaml => "yaml",
            Format::Json => "json",
        }
    }
}

impl FromStr for Format {
    type Err = ComposeError;

    /// Accepts `yaml`, `yml` and `json`, with or without a leading dot
    fn from_str(s: &str) -> Result<Self> {
        match s.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Ok(Format::Yaml),
            "json" => Ok(Format::Json),
            _ => Err(ComposeError::UnsupportedFormat(s.to_string())),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Compose document adapter
pub struct ComposeAdapter;

impl ComposeAdapter {
    /// Load a document from raw bytes in a declared format
    ///
    /// `origin` only identifies the document in logs.
    pub fn load(origin: &str, bytes: &[u8], format: &str) -> Result<ComposeConfig> {
        let format = format.parse::<Format>()?;
        debug!("Loading compose document {} as {} ({} bytes)", origin, format, bytes.len());
        let config = Self::decode(bytes, format)?;
        debug!("Loaded {} services from {}", config.services.len(), origin);
        Ok(config)
    }

    /// Decode bytes in a known format
    ///
    /// YAML merge keys are resolved and scalars keep their source text.
    pub fn decode(bytes: &[u8], format: Format) -> Result<ComposeConfig> {
        let node = match format {
            Format::Yaml => Node::from_yaml(bytes)?,
            Format::Json => Node::from_json(bytes)?,
        };
        ComposeConfig::from_node(node)
    }

    /// Parse a YAML document from a string
    pub fn parse_str(content: &str) -> Result<ComposeConfig> {
        Self::decode(content.as_bytes(), Format::Yaml)
    }

    /// Encode a document in canonical form
    pub fn save(config: &ComposeConfig, format: Format) -> Result<Vec<u8>> {
        let bytes = match format {
            Format::Yaml => Self::to_yaml_string(config)?.into_bytes(),
            Format::Json => {
                let mut bytes = serde_json::to_vec_pretty(config)?;
                bytes.push(b'\n');
                bytes
            }
        };
        debug!("Encoded {} services as {} ({} bytes)", config.services.len(), format, bytes.len());
        Ok(bytes)
    }

    /// Encode a document as YAML, with healthcheck tests in flow style
    pub fn to_yaml_string(config: &ComposeConfig) -> Result<String> {
        let mut value = serde_yaml::to_value(config)?;
        let mut marker = FLOW_PLACEHOLDER.to_string();
        let plain = serde_yaml::to_string(&value)?;
        while plain.contains(&marker) {
            marker.push('_');
        }
        let mut flows = Vec::new();

        if let Some(services) = value.get_mut("services").and_then(Value::as_mapping_mut) {
            for (_, service) in services.iter_mut() {
                let Some(test) = service
                    .get_mut("healthcheck")
                    .and_then(|healthcheck| healthcheck.get_mut("test"))
                else {
                    continue;
                };
                let Some(args) = test.as_sequence() else {
                    continue;
                };
                let placeholder = format!("{}{}__", marker, flows.len());
                flows.push((placeholder.clone(), flow_sequence(args)?));
                *test = Value::String(placeholder);
            }
        }

        let mut text = serde_yaml::to_string(&value)?;
        for (placeholder, flow) in flows {
            text = text.replacen(&placeholder, &flow, 1);
        }
        Ok(text)
    }
}

/// Render scalars as a YAML flow sequence of double-quoted strings
fn flow_sequence(args: &[Value]) -> Result<String> {
    let items = args
        .iter()
        .map(|arg| -> Result<String> {
            match arg {
                Value::String(arg) => Ok(serde_json::to_string(arg)?),
                other => Err(ComposeError::format(format!(
                    "invalid healthcheck test format: {:?}",
                    other
                ))),
            }
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(format!("[{}]", items.join(", ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::codec::{DependsOnConfig, EnvironmentConfig, HealthcheckTest};
    use crate::compose::service::{HealthcheckConfig, ServiceConfig};

    const SAMPLE: &str = r#"
version: "3.8"
services:
  web:
    image: registry.example.com:5000/web:1.4
    container_name: web
    restart: always
    environment:
      - API_URL=http://api:8080
      - MODE=prod
    ports:
      - "80:80"
      - "443:443"
    labels:
      git.repository: https://git.example.com/web.git
    depends_on:
      api:
        condition: service_healthy
      cache:
    networks:
      - front
  api:
    image: example/api
    environment:
      DB_HOST: db
    depends_on:
      - db
    healthcheck:
      test: ["CMD", "curl", "-f", "http://localhost:8080/health"]
      interval: 30s
      timeout: 5s
      retries: 3
      start_period: 10s
    security_opt:
      - no-new-privileges:true
    logging:
      driver: json-file
      options:
        max-size: 10m
  cache:
    image: redis:7
  db:
    image: postgres:16
    privileged: true
    volumes:
      - data:/var/lib/postgresql/data
networks:
  front:
    driver: bridge
  shared:
    name: shared-net
    external: true
volumes:
  data:
    driver: local
secrets:
  token:
    file: ./token.txt
"#;

    fn sample() -> ComposeConfig {
        ComposeAdapter::parse_str(SAMPLE).unwrap()
    }

    #[test]
    fn test_format_selection() {
        assert_eq!("yaml".parse::<Format>().unwrap(), Format::Yaml);
        assert_eq!(".yml".parse::<Format>().unwrap(), Format::Yaml);
        assert_eq!("JSON".parse::<Format>().unwrap(), Format::Json);
        assert!("toml".parse::<Format>().unwrap_err().is_unsupported_format());

        assert_eq!(Format::from_path(Path::new("compose.yml")).unwrap(), Format::Yaml);
        assert_eq!(Format::from_path(Path::new("a/b.json")).unwrap(), Format::Json);
        assert!(Format::from_path(Path::new("compose.toml")).is_err());
        assert!(Format::from_path(Path::new("Composefile")).is_err());
    }

    #[test]
    fn test_load_sample() {
        let config = sample();
        assert_eq!(config.version, "3.8");
        assert_eq!(config.services.len(), 4);

        let web = config.service("web").unwrap();
        assert_eq!(web.name, "web");
        assert_eq!(web.image_name(), "registry.example.com:5000/web");
        assert_eq!(web.version(), "1.4");
        assert_eq!(web.git_registry(), "https://git.example.com/web.git");
        assert_eq!(
            web.environment.as_ref().unwrap().get("API_URL"),
            Some("http://api:8080")
        );

        let deps = web.depends_on.as_ref().unwrap();
        assert_eq!(deps.condition("api"), Some("service_healthy"));
        assert_eq!(deps.condition("cache"), Some(""));

        let api = config.service("api").unwrap();
        assert_eq!(api.version(), "latest");
        assert_eq!(api.healthcheck.as_ref().unwrap().retries, Some(3));

        assert!(config.network("shared").unwrap().external);
        assert!(config.volumes.contains_key("data"));
        assert!(config.secrets.contains_key("token"));
    }

    #[test]
    fn test_load_unsupported_format() {
        let err = ComposeAdapter::load("compose.toml", b"version = 1", "toml").unwrap_err();
        assert!(err.is_unsupported_format());
    }

    #[test]
    fn test_load_propagates_format_error() {
        let yaml = "version: '3'\nservices:\n  web:\n    environment:\n      - FOO\n";
        let err = ComposeAdapter::load("compose.yaml", yaml.as_bytes(), "yaml").unwrap_err();
        assert!(err.is_format(), "unexpected error: {err}");
        assert!(err.to_string().contains("FOO"));

        let json = r#"{"version": "3", "services": {"web": {"depends_on": "db"}}}"#;
        let err = ComposeAdapter::load("compose.json", json.as_bytes(), "json").unwrap_err();
        assert!(err.is_format(), "unexpected error: {err}");
    }

    #[test]
    fn test_load_surfaces_decoder_errors() {
        let err = ComposeAdapter::load("compose.yaml", b"services: [", "yaml").unwrap_err();
        assert!(matches!(err, ComposeError::Yaml(_)));

        let err = ComposeAdapter::load("compose.json", b"{\"services\": ", "json").unwrap_err();
        assert!(matches!(err, ComposeError::Json(_)));

        let err = ComposeAdapter::load("compose.yaml", b"services: {}", "yaml").unwrap_err();
        assert!(matches!(err, ComposeError::Decode(_)), "unexpected error: {err}");
        assert!(err.to_string().contains("version"));
    }

    #[test]
    fn test_user_text_with_format_prefix_is_not_a_format_error() {
        let yaml = r#"
version: '3'
services:
  web:
    healthcheck:
      retries: 'Format error: x'
"#;
        let err = ComposeAdapter::parse_str(yaml).unwrap_err();
        assert!(matches!(err, ComposeError::Decode(_)), "unexpected error: {err}");
        assert!(err.to_string().contains("services.web.healthcheck.retries"));
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = sample();
        let encoded = ComposeAdapter::save(&config, Format::Yaml).unwrap();
        let decoded = ComposeAdapter::decode(&encoded, Format::Yaml).unwrap();
        assert_eq!(decoded, config);
    }

    #[test]
    fn test_json_round_trip() {
        let config = sample();
        let encoded = ComposeAdapter::save(&config, Format::Json).unwrap();
        let decoded = ComposeAdapter::decode(&encoded, Format::Json).unwrap();
        assert_eq!(decoded, config);
    }

    #[test]
    fn test_yaml_to_json_round_trip() {
        let config = sample();
        let json = ComposeAdapter::save(&config, Format::Json).unwrap();
        let from_json = ComposeAdapter::decode(&json, Format::Json).unwrap();
        let yaml = ComposeAdapter::save(&from_json, Format::Yaml).unwrap();
        assert_eq!(ComposeAdapter::decode(&yaml, Format::Yaml).unwrap(), config);
    }

    #[test]
    fn test_canonical_shapes() {
        let text = ComposeAdapter::to_yaml_string(&sample()).unwrap();

        assert!(text.contains(r#"test: ["CMD", "curl", "-f", "http://localhost:8080/health"]"#));

        let value: Value = serde_yaml::from_str(&text).unwrap();
        let services = &value["services"];
        assert!(services["api"]["depends_on"].is_sequence());
        assert!(services["web"]["depends_on"].is_mapping());
        assert!(services["web"]["depends_on"]["cache"].is_null());
        assert_eq!(
            services["web"]["depends_on"]["api"]["condition"].as_str(),
            Some("service_healthy")
        );
        assert!(services["web"]["environment"].is_mapping());
        assert!(services["api"]["healthcheck"]["test"].is_sequence());
    }

    #[test]
    fn test_services_sorted_on_encode() {
        let mut config = ComposeConfig::new("3");
        for name in ["c", "a", "b"] {
            config.set_service(name, ServiceConfig::new("busybox"));
        }

        let text = ComposeAdapter::to_yaml_string(&config).unwrap();
        let a = text.find("  a:").unwrap();
        let b = text.find("  b:").unwrap();
        let c = text.find("  c:").unwrap();
        assert!(a < b && b < c);

        let json = String::from_utf8(ComposeAdapter::save(&config, Format::Json).unwrap()).unwrap();
        let a = json.find("\"a\"").unwrap();
        let b = json.find("\"b\"").unwrap();
        let c = json.find("\"c\"").unwrap();
        assert!(a < b && b < c);
    }

    #[test]
    fn test_built_document_round_trip() {
        let mut web = ServiceConfig::new("nginx:1.25");
        web.environment = Some([("B", "2"), ("A", "1")].into_iter().collect::<EnvironmentConfig>());
        web.depends_on = Some([("db", "")].into_iter().collect::<DependsOnConfig>());
        web.healthcheck = Some(HealthcheckConfig {
            test: Some(HealthcheckTest::new(["CMD-SHELL", "curl -f http://localhost, || exit 1"])),
            disable: false,
            ..Default::default()
        });

        let mut config = ComposeConfig::new("3.8");
        config.set_service("web", web);
        config.set_service("db", ServiceConfig::new("postgres"));

        for format in [Format::Yaml, Format::Json] {
            let encoded = ComposeAdapter::save(&config, format).unwrap();
            assert_eq!(ComposeAdapter::decode(&encoded, format).unwrap(), config);
        }
    }

    #[test]
    fn test_set_version_then_save() {
        let mut config = sample();
        config.service_mut("cache").unwrap().set_version("7.2");

        let text = ComposeAdapter::to_yaml_string(&config).unwrap();
        assert!(text.contains("image: redis:7.2"));
    }

    #[test]
    fn test_unknown_fields_survive() {
        let yaml = r#"
version: '3'
name: shop
services:
  web:
    image: nginx
    command: [nginx, -g, daemon off;]
"#;
        let config = ComposeAdapter::parse_str(yaml).unwrap();
        assert!(config.extra.contains_key("name"));
        assert!(config.service("web").unwrap().extra.contains_key("command"));

        let text = ComposeAdapter::to_yaml_string(&config).unwrap();
        assert!(text.contains("name: shop"));
        assert!(text.contains("command:"));
    }

    #[test]
    fn test_scalar_text_survives_round_trip() {
        let yaml = r#"
version: 3.10
services:
  build:
    image: golang
    environment:
      GO_VERSION: 1.10
      MASK: 0x1F
"#;
        let config = ComposeAdapter::parse_str(yaml).unwrap();
        assert_eq!(config.version, "3.10");
        let env = config.service("build").unwrap().environment.as_ref().unwrap();
        assert_eq!(env.get("GO_VERSION"), Some("1.10"));
        assert_eq!(env.get("MASK"), Some("0x1F"));

        for format in [Format::Yaml, Format::Json] {
            let encoded = ComposeAdapter::save(&config, format).unwrap();
            assert_eq!(ComposeAdapter::decode(&encoded, format).unwrap(), config);
        }
    }

    #[test]
    fn test_merge_keys_resolved() {
        let yaml = r#"
version: "3.8"
x-base: &base
  image: app:1.0
  restart: always
  environment:
    MODE: prod
services:
  web:
    <<: *base
    restart: "no"
  worker:
    <<: [*base]
    image: worker:2.0
"#;
        let config = ComposeAdapter::parse_str(yaml).unwrap();

        let web = config.service("web").unwrap();
        assert_eq!(web.image, "app:1.0");
        assert_eq!(web.restart.as_deref(), Some("no"));
        assert_eq!(web.environment.as_ref().unwrap().get("MODE"), Some("prod"));
        assert!(web.extra.is_empty());

        let worker = config.service("worker").unwrap();
        assert_eq!(worker.image, "worker:2.0");
        assert_eq!(worker.restart.as_deref(), Some("always"));
        assert!(!worker.extra.contains_key("<<"));

        assert!(config.extra.contains_key("x-base"));
        let encoded = ComposeAdapter::save(&config, Format::Yaml).unwrap();
        assert_eq!(ComposeAdapter::decode(&encoded, Format::Yaml).unwrap(), config);
    }

    #[test]
    fn test_flow_placeholder_text_in_document() {
        let mut web = ServiceConfig::new("nginx");
        web.container_name = Some(format!("{}0__", FLOW_PLACEHOLDER));
        web.healthcheck = Some(HealthcheckConfig {
            test: Some(HealthcheckTest::new(["CMD", "true"])),
            ..Default::default()
        });
        let mut config = ComposeConfig::new("3.8");
        config.set_service("web", web);

        let text = ComposeAdapter::to_yaml_string(&config).unwrap();
        assert!(text.contains(r#"test: ["CMD", "true"]"#));
        assert_eq!(ComposeAdapter::parse_str(&text).unwrap(), config);
    }

    #[test]
    fn test_network_extras_round_trip() {
        let yaml = r#"
version: "3.8"
services:
  web:
    image: nginx
    networks: [back]
networks:
  back:
    driver: overlay
    driver_opts:
      encrypted: "true"
    ipam:
      driver: default
      config:
        - subnet: 10.5.0.0/16
"#;
        let config = ComposeAdapter::parse_str(yaml).unwrap();
        let back = config.network("back").unwrap();
        assert!(back.extra.contains_key("ipam"));
        assert!(back.extra.contains_key("driver_opts"));

        for format in [Format::Yaml, Format::Json] {
            let encoded = ComposeAdapter::save(&config, format).unwrap();
            assert_eq!(ComposeAdapter::decode(&encoded, format).unwrap(), config);
        }
    }
}
