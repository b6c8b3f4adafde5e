use anyhow::Result;
use clap::{Parser, ValueEnum};
use grabber_common::OutputFormat;
use grabber_common::observability::init_logging;
use grabber_config::{GrabberConfig, GrabberConfigLoader};
use grabber_web::{ElementGrabber, TitleFetcher};
use std::path::PathBuf;

const DEFAULT_CONFIG_FILE: &str = "grabber.yaml";

/// Fetch page titles (or another element) for a batch of URLs.
#[derive(Debug, Parser)]
#[command(name = "grabber-app", version, about)]
struct Cli {
    #[arg(value_name = "URL", required = true)]
    urls: Vec<String>,

    /// Config file; `grabber.yaml` in the working directory is used when present.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Extract this element's raw text instead of a display title.
    #[arg(short, long, value_name = "TAG")]
    element: Option<String>,

    #[arg(long, value_name = "BYTES")]
    read_limit: Option<u64>,

    #[arg(long, value_name = "CHARS")]
    target: Option<usize>,

    #[arg(long, value_name = "CHARS")]
    max: Option<usize>,

    /// Keep titles whose words all appear in the URL.
    #[arg(long, default_value_t = false)]
    keep_url_titles: bool,

    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Log to stderr.
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

impl From<Format> for OutputFormat {
    fn from(value: Format) -> Self {
        match value {
            Format::Text => OutputFormat::Text,
            Format::Json => OutputFormat::Json,
        }
    }
}

impl Cli {
    /// Flags win over file and environment settings.
    fn apply_overrides(&self, cfg: &mut GrabberConfig) {
        if let Some(limit) = self.read_limit {
            cfg.fetch.read_limit_bytes = limit;
        }
        if let Some(target) = self.target {
            cfg.title.target = target;
        }
        if let Some(max) = self.max {
            cfg.title.max = max;
            // A lone --max pulls the inherited target down with it.
            if self.target.is_none() {
                cfg.title.target = cfg.title.target.min(max);
            }
        }
        if self.keep_url_titles {
            cfg.title.reject_if_derivable_from_url = false;
        }
        if self.verbose {
            cfg.log.stderr = true;
        }
    }
}

enum Lookup {
    Title(TitleFetcher),
    Element(ElementGrabber),
}

impl Lookup {
    fn new(element: Option<&str>, cfg: &GrabberConfig) -> Result<Self> {
        Ok(match element {
            Some(tag) => Lookup::Element(ElementGrabber::new(tag, cfg.fetch.clone())?),
            None => Lookup::Title(TitleFetcher::new(cfg.fetch.clone(), cfg.title.clone())?),
        })
    }

    async fn run(&self, url: &str) -> Option<String> {
        match self {
            Lookup::Title(fetcher) => fetcher.fetch(url).await,
            Lookup::Element(grabber) => grabber.from_url(url).await,
        }
    }
}

fn render(format: OutputFormat, url: &str, found: Option<&str>) -> String {
    match format {
        OutputFormat::Text => found.unwrap_or("null").to_string(),
        OutputFormat::Json => serde_json::json!({ "url": url, "title": found }).to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1) Load config (flags > env > file)
    let loader = match &cli.config {
        Some(path) => GrabberConfigLoader::new().with_file(path),
        None => GrabberConfigLoader::new().with_optional_file(DEFAULT_CONFIG_FILE),
    };
    let mut cfg = loader.load()?;
    cli.apply_overrides(&mut cfg);

    // 2) Logging
    if let Some(path) = init_logging(cfg.log.to_log_config("grabber"))? {
        tracing::debug!(path = %path.display(), "log.file");
    }

    // 3) One line per URL, in order
    let lookup = Lookup::new(cli.element.as_deref(), &cfg)?;
    let format = OutputFormat::from(cli.format);
    for url in &cli.urls {
        let found = lookup.run(url).await;
        println!("{}", render(format, url, found.as_deref()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let cli = Cli::parse_from([
            "grabber-app",
            "--read-limit",
            "2048",
            "--target",
            "30",
            "--max",
            "40",
            "--keep-url-titles",
            "-v",
            "http://example.com",
        ]);
        let mut cfg = GrabberConfig::default();
        cli.apply_overrides(&mut cfg);

        assert_eq!(cfg.fetch.read_limit_bytes, 2048);
        assert_eq!((cfg.title.target, cfg.title.max), (30, 40));
        assert!(!cfg.title.reject_if_derivable_from_url);
        assert!(cfg.log.stderr);
        assert_eq!(cli.urls, vec!["http://example.com".to_string()]);
    }

    #[test]
    fn no_flags_leave_config_alone() {
        let cli = Cli::parse_from(["grabber-app", "http://a.test", "http://b.test"]);
        let mut cfg = GrabberConfig::default();
        cli.apply_overrides(&mut cfg);
        assert_eq!(cfg, GrabberConfig::default());
        assert_eq!(cli.format, Format::Text);
        assert_eq!(cli.urls.len(), 2);
    }

    #[test]
    fn lone_max_clamps_target() {
        let cli = Cli::parse_from(["grabber-app", "--max", "60", "http://example.com"]);
        let mut cfg = GrabberConfig::default();
        cli.apply_overrides(&mut cfg);
        assert_eq!((cfg.title.target, cfg.title.max), (60, 60));
        assert!(Lookup::new(None, &cfg).is_ok());

        let cli = Cli::parse_from(["grabber-app", "--max", "200", "http://example.com"]);
        let mut cfg = GrabberConfig::default();
        cli.apply_overrides(&mut cfg);
        assert_eq!((cfg.title.target, cfg.title.max), (80, 200));
    }

    #[test]
    fn explicit_target_above_max_is_still_rejected() {
        let cli = Cli::parse_from([
            "grabber-app",
            "--target",
            "90",
            "--max",
            "60",
            "http://example.com",
        ]);
        let mut cfg = GrabberConfig::default();
        cli.apply_overrides(&mut cfg);
        assert!(Lookup::new(None, &cfg).is_err());
    }

    #[test]
    fn urls_are_required() {
        assert!(Cli::try_parse_from(["grabber-app"]).is_err());
    }

    #[test]
    fn element_and_format_flags() {
        let cli = Cli::parse_from([
            "grabber-app",
            "--element",
            "h1",
            "--format",
            "json",
            "http://example.com",
        ]);
        assert_eq!(cli.element.as_deref(), Some("h1"));
        assert_eq!(OutputFormat::from(cli.format), OutputFormat::Json);
    }

    #[test]
    fn rendering() {
        assert_eq!(render(OutputFormat::Text, "http://x", Some("Hi")), "Hi");
        assert_eq!(render(OutputFormat::Text, "http://x", None), "null");

        let line = render(OutputFormat::Json, "http://x", None);
        let v: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(v["url"], "http://x");
        assert!(v["title"].is_null());

        let line = render(OutputFormat::Json, "http://x", Some("Say \"hi\""));
        let v: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(v["title"], "Say \"hi\"");
    }

    #[test]
    fn lookup_rejects_invalid_settings() {
        let mut cfg = GrabberConfig::default();
        cfg.title.max = 0;
        assert!(Lookup::new(None, &cfg).is_err());
        assert!(Lookup::new(Some("h1"), &cfg).is_ok());
    }
}
