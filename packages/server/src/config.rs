//! Server configuration from environment variables and command-line
//! arguments.

use std::path::PathBuf;

use clap::Parser;
use heat_priority_index::registry::DEFAULT_SCHEME_ID;

/// Ward archive loaded when `WARD_ARCHIVE` is not set.
pub const DEFAULT_WARD_ARCHIVE: &str = "assets/ahmedabad_wards.zip";

/// City named in report titles when `REPORT_CITY` is not set.
pub const DEFAULT_CITY: &str = "Ahmedabad";

/// Command-line overrides for the server configuration.
#[derive(Debug, Default, Parser)]
#[command(
    name = "heat_priority_server",
    about = "Serve ward heat priority scores, reports and explanations"
)]
pub struct Args {
    /// Address to bind to (overrides `BIND_ADDR`)
    #[arg(long)]
    pub bind: Option<String>,

    /// Port to listen on (overrides `PORT`)
    #[arg(long)]
    pub port: Option<u16>,

    /// Zipped shapefile of reference wards (overrides `WARD_ARCHIVE`)
    #[arg(long)]
    pub ward_archive: Option<PathBuf>,

    /// Composite scheme id (overrides `COMPOSITE_SCHEME`)
    #[arg(long)]
    pub scheme: Option<String>,
}

/// Resolved server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: String,
    /// Port to listen on.
    pub port: u16,
    /// Reference ward archive.
    pub ward_archive: PathBuf,
    /// Whether the archive was configured explicitly. A missing explicit
    /// archive is fatal; a missing default one is not.
    pub ward_archive_explicit: bool,
    /// Directory reports are written to and served from.
    pub report_dir: PathBuf,
    /// City named in report titles.
    pub city: Option<String>,
    /// TrueType font embedded in reports, for ward names beyond Latin-1.
    pub report_font: Option<PathBuf>,
    /// Embedded scheme id.
    pub scheme_id: String,
    /// Scheme TOML file, used instead of `scheme_id` when set.
    pub scheme_file: Option<PathBuf>,
}

impl ServerConfig {
    /// Reads the configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through a variable lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let ward_archive = var("WARD_ARCHIVE");

        Self {
            bind_addr: var("BIND_ADDR").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: var("PORT").and_then(|p| p.parse().ok()).unwrap_or(8080),
            ward_archive_explicit: ward_archive.is_some(),
            ward_archive: ward_archive.map_or_else(|| PathBuf::from(DEFAULT_WARD_ARCHIVE), PathBuf::from),
            report_dir: var("REPORT_DIR").map_or_else(|| PathBuf::from("."), PathBuf::from),
            city: Some(var("REPORT_CITY").unwrap_or_else(|| DEFAULT_CITY.to_string())),
            report_font: var("REPORT_FONT").map(PathBuf::from),
            scheme_id: var("COMPOSITE_SCHEME").unwrap_or_else(|| DEFAULT_SCHEME_ID.to_string()),
            scheme_file: var("COMPOSITE_SCHEME_FILE").map(PathBuf::from),
        }
    }

    /// Applies command-line overrides.
    #[must_use]
    pub fn with_args(mut self, args: Args) -> Self {
        if let Some(bind) = args.bind {
            self.bind_addr = bind;
        }
        if let Some(port) = args.port {
            self.port = port;
        }
        if let Some(archive) = args.ward_archive {
            self.ward_archive = archive;
            self.ward_archive_explicit = true;
        }
        if let Some(scheme) = args.scheme {
            self.scheme_id = scheme;
            self.scheme_file = None;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn config(vars: &[(&str, &str)]) -> ServerConfig {
        let vars: BTreeMap<&str, &str> = vars.iter().copied().collect();
        ServerConfig::from_lookup(|name| vars.get(name).map(|v| (*v).to_string()))
    }

    #[test]
    fn defaults() {
        let config = config(&[]);
        assert_eq!(config.bind_addr, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.ward_archive, PathBuf::from(DEFAULT_WARD_ARCHIVE));
        assert!(!config.ward_archive_explicit);
        assert_eq!(config.report_dir, PathBuf::from("."));
        assert_eq!(config.city.as_deref(), Some("Ahmedabad"));
        assert!(config.report_font.is_none());
        assert_eq!(config.scheme_id, DEFAULT_SCHEME_ID);
        assert!(config.scheme_file.is_none());
    }

    #[test]
    fn environment_overrides() {
        let config = config(&[
            ("PORT", "9000"),
            ("WARD_ARCHIVE", "/data/surat.zip"),
            ("REPORT_DIR", "/tmp/reports"),
            ("REPORT_CITY", "Surat"),
            ("REPORT_FONT", "/usr/share/fonts/NotoSansGujarati.ttf"),
            ("COMPOSITE_SCHEME_FILE", "/etc/scheme.toml"),
        ]);
        assert_eq!(config.port, 9000);
        assert!(config.ward_archive_explicit);
        assert_eq!(config.report_dir, PathBuf::from("/tmp/reports"));
        assert_eq!(config.city.as_deref(), Some("Surat"));
        assert_eq!(
            config.report_font,
            Some(PathBuf::from("/usr/share/fonts/NotoSansGujarati.ttf"))
        );
        assert_eq!(config.scheme_file, Some(PathBuf::from("/etc/scheme.toml")));
    }

    #[test]
    fn unparsable_port_falls_back() {
        assert_eq!(config(&[("PORT", "eighty")]).port, 8080);
    }

    #[test]
    fn arguments_override_environment() {
        let args = Args::parse_from([
            "heat_priority_server",
            "--bind",
            "0.0.0.0",
            "--port",
            "3000",
            "--ward-archive",
            "wards.zip",
            "--scheme",
            "heat_vulnerability_daytime",
        ]);
        let config = config(&[("PORT", "9000"), ("COMPOSITE_SCHEME_FILE", "x.toml")]).with_args(args);

        assert_eq!(config.bind_addr, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.ward_archive, PathBuf::from("wards.zip"));
        assert!(config.ward_archive_explicit);
        assert_eq!(config.scheme_id, "heat_vulnerability_daytime");
        assert!(config.scheme_file.is_none());
    }
}
