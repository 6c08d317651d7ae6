use std::time::Duration;

use console::style;
use kinescope_core::{
    Application, Config, HttpConfig, KinesisConfig, StaticCredentials, config, shutdown_signal,
};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "info,tower_http=info";

#[derive(Debug, Clone, PartialEq, clap::Args)]
pub struct RunCommand {
    /// Address the HTTP gateway binds to
    #[arg(long, env = "HTTP_HOST", default_value = config::DEFAULT_HTTP_HOST)]
    pub host: String,

    /// Port the HTTP gateway listens on
    #[arg(long, env = "HTTP_PORT", default_value_t = config::DEFAULT_HTTP_PORT)]
    pub port: u16,

    /// AWS region of the Kinesis streams
    #[arg(long, env = "AWS_REGION")]
    pub aws_region: String,

    /// Kinesis endpoint to use instead of the regional one (e.g. localstack)
    #[arg(long, env = "AWS_ENDPOINT_OVERRIDE")]
    pub aws_endpoint_override: Option<String>,

    /// Static access key id; the default credential chain is used when unset
    #[arg(long, env = "AWS_ACCESS_KEY_ID")]
    pub aws_access_key_id: Option<String>,

    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub aws_secret_access_key: Option<String>,

    #[arg(long, env = "AWS_SESSION_TOKEN", hide_env_values = true)]
    pub aws_session_token: Option<String>,

    /// Page size when a request has no limit
    #[arg(long, env = "KINESCOPE_DEFAULT_LIMIT", default_value_t = config::DEFAULT_LIMIT)]
    pub default_limit: u32,

    /// How long the gateway waits for the Kinesis worker
    #[arg(long, env = "KINESCOPE_REQUEST_TIMEOUT_MS", default_value_t = 10_000)]
    pub request_timeout_ms: u64,

    /// Kinesis calls kept outstanding per operation
    #[arg(long, env = "KINESCOPE_MAX_IN_FLIGHT", default_value_t = config::DEFAULT_MAX_IN_FLIGHT)]
    pub max_in_flight: usize,
}

impl RunCommand {
    fn config(&self) -> Result<Config, String> {
        let credentials = StaticCredentials::from_parts(
            self.aws_access_key_id.clone(),
            self.aws_secret_access_key.clone(),
            self.aws_session_token.clone(),
        )
        .map_err(|e| e.to_string())?;

        let mut kinesis = KinesisConfig::new(&self.aws_region);
        if let Some(endpoint) = &self.aws_endpoint_override {
            kinesis = kinesis.with_endpoint_override(endpoint);
        }
        if let Some(credentials) = credentials {
            kinesis = kinesis.with_credentials(credentials);
        }

        let config = Config {
            http: HttpConfig {
                host: self.host.clone(),
                port: self.port,
            },
            kinesis,
            default_limit: self.default_limit,
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            max_in_flight: self.max_in_flight,
        };
        config.validate().map_err(|e| e.to_string())?;
        Ok(config)
    }

    pub async fn execute(&self) -> Result<(), String> {
        let config = self.config()?;

        println!();
        println!("{}{}", style("Kine").white(), style("scope").cyan());
        println!("{}", style("Starting Kinesis gateway").dim());
        println!();
        println!("{} {}", style("Region").dim(), config.kinesis.region);
        if let Some(endpoint) = &config.kinesis.endpoint_override {
            println!("{} {}", style("Endpoint").dim(), endpoint);
        }
        println!("{} {}:{}", style("Listen").dim(), config.http.host, config.http.port);
        println!();
        println!("{}", style("Endpoints").dim());
        println!("  GET http://localhost:{}/kinesis", config.http.port);
        println!("  GET http://localhost:{}/kinesis/{{stream}}", config.http.port);
        println!(
            "  GET http://localhost:{}/kinesis/{{stream}}/{{shard}}",
            config.http.port
        );
        println!("  GET http://localhost:{}/health", config.http.port);
        println!();

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
        tracing_subscriber::fmt().with_env_filter(filter).init();

        let app = Application::start(config)
            .await
            .map_err(|e| e.to_string())?;
        app.run(shutdown_signal()).await.map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        run: RunCommand,
    }

    fn parse(args: &[&str]) -> RunCommand {
        let args = std::iter::once("kinescope").chain(args.iter().copied());
        Harness::try_parse_from(args).unwrap().run
    }

    #[test]
    fn test_flags_build_config() {
        let mut cmd = parse(&[
            "--aws-region",
            "eu-central-1",
            "--aws-endpoint-override",
            "http://localhost:4566",
            "--aws-access-key-id",
            "local",
            "--aws-secret-access-key",
            "secret",
            "--port",
            "9000",
            "--default-limit",
            "10",
        ]);
        cmd.aws_session_token = None;

        let config = cmd.config().unwrap();
        assert_eq!(config.http.port, 9000);
        assert_eq!(config.default_limit, 10);
        assert_eq!(
            config.kinesis.endpoint_override.as_deref(),
            Some("http://localhost:4566")
        );
        assert_eq!(config.kinesis.credentials.unwrap().kind(), "basic");
    }

    #[test]
    fn test_partial_credentials_are_rejected() {
        let mut cmd = parse(&[
            "--aws-region",
            "eu-central-1",
            "--aws-access-key-id",
            "local",
        ]);
        cmd.aws_secret_access_key = None;

        assert!(cmd.config().unwrap_err().contains("AWS_SECRET_ACCESS_KEY"));
    }
}
