//! wikiquery — compile and run typed queries against a MediaWiki API.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use wikiquery::{
    Downloader, DownloaderConfig, HttpQueryParameter, ModuleDescriptor, QueryResult, QuerySpec,
    WikiInfo, WikiQuery,
};

#[derive(Parser)]
#[command(
    name = "wikiquery",
    about = "Compile and run typed queries against a MediaWiki-style API",
    version
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the wire parameters a query compiles to.
    Compile {
        /// Module descriptor (JSON).
        #[arg(short, long)]
        module: PathBuf,

        /// Query description (JSON).
        #[arg(short, long)]
        query: Option<PathBuf>,
    },

    /// Compile a query, send it, and print the projected rows as JSON.
    Run {
        /// Module descriptor (JSON).
        #[arg(short, long)]
        module: PathBuf,

        /// Query description (JSON).
        #[arg(short, long)]
        query: Option<PathBuf>,

        #[command(flatten)]
        wiki: WikiArgs,
    },

    /// Send raw `name=value` parameters and print the response.
    Raw {
        /// Parameters, in order (e.g. `-p action=query -p titles=A|B`).
        #[arg(short = 'p', long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,

        #[command(flatten)]
        wiki: WikiArgs,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[derive(Args)]
struct WikiArgs {
    /// Base URL of the wiki (e.g. https://en.wikipedia.org).
    #[arg(long)]
    base_url: String,

    /// Path of the API entry point below the base URL.
    #[arg(long)]
    api_path: Option<String>,

    /// User agent identifying the caller.
    #[arg(long, default_value = "wikiquery-cli")]
    user_agent: String,

    /// Do not send the maxlag parameter.
    /// Also reads WIKIQUERY_MAXLAG.
    #[arg(long)]
    no_maxlag: bool,

    /// Log every request before sending it.
    /// Also reads WIKIQUERY_LOG_REQUESTS.
    #[arg(long)]
    log_requests: bool,
}

impl WikiArgs {
    /// Explicit flags win over the environment, which wins over defaults.
    fn config(&self) -> DownloaderConfig {
        let mut config = DownloaderConfig::from_env();
        if self.no_maxlag {
            config.use_maxlag = false;
        }
        if self.log_requests {
            config.log_requests = true;
        }
        config
    }

    fn downloader(&self) -> anyhow::Result<Downloader> {
        let wiki = WikiInfo::new(&self.user_agent, &self.base_url, self.api_path.as_deref())?;
        Ok(Downloader::new(wiki, self.config())?)
    }
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, _)) if name.is_empty() => Err(format!("missing parameter name in '{raw}'")),
        Some((name, value)) => Ok((name.to_string(), value.to_string())),
        None => Err(format!("expected name=value, got '{raw}'")),
    }
}

fn load_module(path: &Path) -> anyhow::Result<ModuleDescriptor> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading module descriptor {}", path.display()))?;
    let module: ModuleDescriptor = serde_json::from_str(&text)
        .with_context(|| format!("parsing module descriptor {}", path.display()))?;
    if module.name.is_empty() {
        bail!("module descriptor {} has an empty moduleName", path.display());
    }
    Ok(module)
}

fn load_query(path: Option<&Path>) -> anyhow::Result<QuerySpec> {
    let Some(path) = path else {
        return Ok(QuerySpec::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading query {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing query {}", path.display()))
}

fn compile(module: &Path, query: Option<&Path>) -> anyhow::Result<Vec<HttpQueryParameter>> {
    let module = load_module(module)?;
    let spec = load_query(query)?;
    let query = WikiQuery::from_spec(&module, &spec)?;
    Ok(query.to_request())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Compile { module, query } => {
            for parameter in compile(&module, query.as_deref())? {
                println!("{parameter}");
            }
        }
        Commands::Run {
            module,
            query,
            wiki,
        } => {
            let module = load_module(&module)?;
            let spec = load_query(query.as_deref())?;
            let query = WikiQuery::from_spec(&module, &spec)?;
            let downloader = wiki.downloader()?;

            tracing::info!(module = %module.name, endpoint = %downloader.endpoint(), "running query");
            let output = match query.execute(&downloader).await? {
                QueryResult::List(rows) => serde_json::Value::Array(rows),
                QueryResult::Single(row) => row,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Raw { params, wiki } => {
            let downloader = wiki.downloader()?;
            let params: Vec<HttpQueryParameter> = params
                .into_iter()
                .map(|(name, value)| HttpQueryParameter::value(name, value))
                .collect();

            let document = downloader.download(&params).await?;
            match document.root {
                Some(root) => println!("{root}"),
                None => tracing::warn!("empty response"),
            }
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "wikiquery", &mut std::io::stdout());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    const MODULE: &str = r#"{
        "moduleName": "allpages",
        "wireParameterPrefix": "ap",
        "propertyList": [
            {"name": "title", "wireType": "string"},
            {"name": "redirect", "wireType": "boolean"}
        ],
        "listResult": true
    }"#;

    #[test]
    fn test_parse_param() {
        assert_eq!(
            parse_param("titles=A|B").unwrap(),
            ("titles".to_string(), "A|B".to_string())
        );
        assert_eq!(parse_param("flag=").unwrap(), ("flag".to_string(), String::new()));
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=x").is_err());
    }

    #[test]
    fn test_cli_parses_raw() {
        let cli = Cli::try_parse_from([
            "wikiquery",
            "raw",
            "--base-url",
            "https://en.wikipedia.org",
            "-p",
            "action=query",
            "-p",
            "titles=A|B",
            "--no-maxlag",
        ])
        .unwrap();

        match cli.command {
            Commands::Raw { params, wiki } => {
                assert_eq!(params.len(), 2);
                assert_eq!(params[1].1, "A|B");
                assert!(!wiki.config().use_maxlag);
            }
            _ => panic!("expected raw command"),
        }
    }

    #[test]
    fn test_compile_from_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let module = write_temp(&dir, "module.json", MODULE);
        let query = write_temp(
            &dir,
            "query.json",
            r#"{"filter": {"kind": "member", "target": {"kind": "identity"}, "name": "redirect"}}"#,
        );

        let request: Vec<String> = compile(&module, Some(&query))
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            request,
            [
                "action=query",
                "list=allpages",
                "approp=title|redirect",
                "aplimit=max",
                "apredirect=",
            ]
        );
    }

    #[test]
    fn test_compile_reports_unsupported_filter() {
        let dir = tempfile::TempDir::new().unwrap();
        let module = write_temp(&dir, "module.json", MODULE);
        let query = write_temp(
            &dir,
            "query.json",
            r#"{"filter": {"kind": "or",
                           "left": {"kind": "member", "target": {"kind": "identity"}, "name": "redirect"},
                           "right": {"kind": "member", "target": {"kind": "identity"}, "name": "title"}}}"#,
        );

        let err = compile(&module, Some(&query)).unwrap_err();
        assert!(err.to_string().contains("x.redirect || x.title"), "{err}");
    }

    #[test]
    fn test_missing_module_file() {
        assert!(load_module(Path::new("/nonexistent/module.json")).is_err());
    }
}
