//! Lakejob CLI - submit and track Data Lake Analytics jobs from the terminal
//!
//! This binary can:
//! - Authenticate against Azure AD (device code, username/password,
//!   client secret or client certificate)
//! - Submit a U-SQL job and wait for it to end
//! - Show the status of a job or cancel it
//! - Print the effective configuration

mod signals;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use lakejob_core::auth::{self, AuthMethod, DeviceCodeEvent, TokenCredential};
use lakejob_core::config::{self, Settings};
use lakejob_core::jobs::{self, JobClient, JobError, JobInformation, JobProgress, PollPolicy};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "lakejob")]
#[command(author = "Lakejob Contributors")]
#[command(version)]
#[command(about = "Submit and track Azure Data Lake Analytics jobs")]
#[command(long_about = "
Lakejob authenticates against Azure Active Directory and runs U-SQL jobs
on a Data Lake Analytics account.

Quick start:
  1. Check your token:   lakejob login
  2. Run the sample job: lakejob submit --account myadla
  3. Inspect a job:      lakejob status <JOB_ID> --account myadla

Settings can also come from a config file or LAKEJOB_* environment
variables; see: lakejob config
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Config file to use instead of the default location
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
pub enum Method {
    /// Sign in on another device with a one-time code
    DeviceCode,
    /// User name and password from config
    UsernamePassword,
    /// Service principal secret from config
    ClientSecret,
    /// Service principal certificate key from config
    ClientCertificate,
}

impl From<Method> for AuthMethod {
    fn from(method: Method) -> Self {
        match method {
            Method::DeviceCode => AuthMethod::DeviceCode,
            Method::UsernamePassword => AuthMethod::UsernamePassword,
            Method::ClientSecret => AuthMethod::ClientSecret,
            Method::ClientCertificate => AuthMethod::ClientCertificate,
        }
    }
}

#[derive(Args, Debug)]
pub struct AccountArgs {
    /// Authentication method
    #[arg(short, long, default_value = "device-code")]
    pub method: Method,

    /// Data Lake Analytics account (overrides config)
    #[arg(short, long)]
    pub account: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct PollArgs {
    /// Seconds between status checks
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: Option<u64>,

    /// Multiply the wait by this factor after each check
    #[arg(long, value_name = "FACTOR")]
    pub backoff: Option<f64>,

    /// Upper bound for backed-off waits
    #[arg(long, value_name = "SECS")]
    pub max_interval: Option<u64>,

    /// Stop waiting after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Acquire a token and show who it belongs to
    Login {
        /// Authentication method
        #[arg(short, long, default_value = "device-code")]
        method: Method,
    },

    /// Submit a U-SQL job and wait for it to end
    Submit {
        #[command(flatten)]
        target: AccountArgs,

        /// Job name
        #[arg(short, long, default_value = jobs::HELLO_WORLD_JOB_NAME)]
        name: String,

        /// Read the script from a file instead of running the sample job
        #[arg(short, long, value_name = "PATH")]
        script_file: Option<PathBuf>,

        /// Degree of parallelism
        #[arg(long)]
        parallelism: Option<u32>,

        /// Job priority (lower runs first)
        #[arg(long)]
        priority: Option<u32>,

        /// Return right after submitting
        #[arg(long)]
        no_wait: bool,

        #[command(flatten)]
        poll: PollArgs,

        /// Cancel the job if interrupted while waiting
        #[arg(long)]
        cancel_on_interrupt: bool,
    },

    /// Show the current state of a job
    Status {
        job_id: Uuid,

        #[command(flatten)]
        target: AccountArgs,
    },

    /// Cancel a running job
    Cancel {
        job_id: Uuid,

        #[command(flatten)]
        target: AccountArgs,
    },

    /// Show configuration paths and settings
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("lakejob={},lakejob_core={}", log_level, log_level).into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let settings = config::load_settings(cli.config.as_deref())?;

    match &cli.command {
        Commands::Login { method } => cmd_login(&cli, &settings, *method).await,
        Commands::Submit {
            target,
            name,
            script_file,
            parallelism,
            priority,
            no_wait,
            poll,
            cancel_on_interrupt,
        } => {
            let mut job = match script_file {
                Some(path) => {
                    let script = std::fs::read_to_string(path)
                        .with_context(|| format!("Failed to read script {}", path.display()))?;
                    JobInformation::usql(name, &script)
                }
                None => JobInformation::usql(name, jobs::HELLO_WORLD_SCRIPT),
            };
            if let Some(degree) = parallelism {
                job = job.with_parallelism(*degree);
            }
            if let Some(priority) = priority {
                job = job.with_priority(*priority);
            }
            let policy = apply_poll_args(settings.poll.clone(), poll);
            cmd_submit(&cli, &settings, target, &job, &policy, *no_wait, *cancel_on_interrupt).await
        }
        Commands::Status { job_id, target } => cmd_status(&cli, &settings, target, job_id).await,
        Commands::Cancel { job_id, target } => cmd_cancel(&cli, &settings, target, job_id).await,
        Commands::Config => cmd_config(&cli, &settings),
    }
}

/// Layer poll flags over the configured policy
fn apply_poll_args(mut policy: PollPolicy, args: &PollArgs) -> PollPolicy {
    if let Some(secs) = args.interval {
        policy = policy.with_interval(Duration::from_secs(secs));
    }
    if args.backoff.is_some() || args.max_interval.is_some() {
        let factor = args.backoff.unwrap_or(policy.backoff_factor);
        let max = args
            .max_interval
            .map(Duration::from_secs)
            .unwrap_or(policy.max_interval);
        policy = policy.with_backoff(factor, max);
    }
    if let Some(secs) = args.timeout {
        policy = policy.with_timeout(Duration::from_secs(secs));
    }
    policy
}

fn format_secs(duration: Duration) -> String {
    if duration.subsec_millis() == 0 {
        duration.as_secs().to_string()
    } else {
        format!("{:.1}", duration.as_secs_f64())
    }
}

fn progress_line(progress: &JobProgress) -> String {
    format!(
        "Job is not yet done. Waiting for {} seconds. Current state: {}",
        format_secs(progress.next_check_in),
        progress.state
    )
}

fn finished_line(job: &JobInformation) -> String {
    format!("Job finished with result: {}", job.result.unwrap_or_default())
}

async fn login(cli: &Cli, settings: &Settings, method: Method) -> Result<TokenCredential> {
    let format = cli.format;
    let on_code = move |event: &DeviceCodeEvent| match format {
        OutputFormat::Text => {
            println!();
            println!("{}", event.message);
            println!();
        }
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "status": "awaiting_authorization",
                "verification_url": event.verification_url,
                "user_code": event.user_code,
                "expires_in": event.expires_in,
            }));
        }
    };

    let credential = auth::authenticate(
        &settings.identity,
        method.into(),
        lakejob_core::http::default_client(),
        Some(on_code),
    )
    .await
    .with_context(|| format!("Authentication using {} failed", AuthMethod::from(method)))?;

    Ok(credential)
}

async fn job_client(cli: &Cli, settings: &Settings, target: &AccountArgs) -> Result<(JobClient, String)> {
    let account = match &target.account {
        Some(account) => account.clone(),
        None => settings.analytics.require_account()?.to_string(),
    };
    let credential = login(cli, settings, target.method).await?;
    Ok((JobClient::new(credential, &settings.analytics.dns_suffix), account))
}

fn job_json(job_id: &Uuid, job: &JobInformation) -> serde_json::Value {
    serde_json::json!({
        "job_id": job_id,
        "name": job.name,
        "submitter": job.submitter,
        "state": job.state().to_string(),
        "result": job.result.unwrap_or_default().to_string(),
        "submit_time": job.submit_time,
        "start_time": job.start_time,
        "end_time": job.end_time,
        "errors": job.error_message,
    })
}

async fn cmd_login(cli: &Cli, settings: &Settings, method: Method) -> Result<()> {
    if cli.format == OutputFormat::Text {
        println!("Authenticating using {}...", AuthMethod::from(method));
    }

    let credential = login(cli, settings, method).await?;

    match cli.format {
        OutputFormat::Text => {
            println!("Authenticated.");
            println!();
            println!("Client id: {}", credential.client_id);
            println!("Resource:  {}", credential.resource);
            if let Some(user) = &credential.user_id {
                println!("User:      {}", user);
            }
            match credential.expires_at {
                Some(expires_at) => println!("Expires:   {}", expires_at.to_rfc3339()),
                None => println!("Expires:   -"),
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "status": "authenticated",
                "method": AuthMethod::from(method),
                "client_id": credential.client_id,
                "resource": credential.resource,
                "user_id": credential.user_id,
                "expires_at": credential.expires_at,
            }));
        }
    }

    Ok(())
}

async fn cmd_submit(
    cli: &Cli,
    settings: &Settings,
    target: &AccountArgs,
    job: &JobInformation,
    policy: &PollPolicy,
    no_wait: bool,
    cancel_on_interrupt: bool,
) -> Result<()> {
    let (client, account) = job_client(cli, settings, target).await?;

    let submitted = jobs::submit(&client, &account, job)
        .await
        .context("Failed to submit job")?;

    if no_wait {
        match cli.format {
            OutputFormat::Text => {
                println!("Submitted job '{}' with id {}", job.name, submitted.job_id);
                println!("Current state: {}", submitted.info.state());
            }
            OutputFormat::Json => println!("{}", job_json(&submitted.job_id, &submitted.info)),
        }
        return Ok(());
    }

    if cli.format == OutputFormat::Text {
        println!("Submitted job '{}' with id {}", job.name, submitted.job_id);
    }

    // Print progress in text mode
    let progress_callback: Option<jobs::ProgressCallback> = match cli.format {
        OutputFormat::Text => Some(Box::new(|progress: &JobProgress| {
            println!("{}", progress_line(progress));
        })),
        OutputFormat::Json => None,
    };

    let cancel = CancellationToken::new();
    signals::cancel_on_shutdown(cancel.clone());

    let outcome = jobs::wait_for_completion(
        &client,
        &account,
        &submitted.job_id,
        policy,
        &cancel,
        progress_callback.as_ref(),
    )
    .await;

    match outcome {
        Ok(finished) => {
            match cli.format {
                OutputFormat::Text => println!("{}", finished_line(&finished)),
                OutputFormat::Json => println!("{}", job_json(&submitted.job_id, &finished)),
            }
            Ok(())
        }
        Err(JobError::Cancelled { job_id }) if cancel_on_interrupt => {
            client
                .cancel_job(&account, &job_id)
                .await
                .with_context(|| format!("Failed to cancel job {}", job_id))?;
            match cli.format {
                OutputFormat::Text => println!("Interrupted; requested cancellation of job {}", job_id),
                OutputFormat::Json => {
                    println!("{}", serde_json::json!({
                        "status": "cancel_requested",
                        "job_id": job_id,
                    }));
                }
            }
            Ok(())
        }
        Err(JobError::Cancelled { job_id }) => {
            match cli.format {
                OutputFormat::Text => {
                    println!("Stopped waiting. Job {} keeps running on the service.", job_id);
                }
                OutputFormat::Json => {
                    println!("{}", serde_json::json!({
                        "status": "detached",
                        "job_id": job_id,
                    }));
                }
            }
            Ok(())
        }
        Err(e) => Err(e).context("Failed while waiting for job"),
    }
}

async fn cmd_status(cli: &Cli, settings: &Settings, target: &AccountArgs, job_id: &Uuid) -> Result<()> {
    let (client, account) = job_client(cli, settings, target).await?;
    let job = client
        .get_job(&account, job_id)
        .await
        .with_context(|| format!("Failed to fetch job {}", job_id))?;

    match cli.format {
        OutputFormat::Text => {
            println!("Job:       {} ({})", job.name, job_id);
            println!("Submitter: {}", job.submitter.as_deref().unwrap_or("-"));
            println!("State:     {}", job.state());
            if job.is_ended() {
                println!("Result:    {}", job.result.unwrap_or_default());
            }
            for error in job.error_message.iter().flatten() {
                println!(
                    "Error:     {}",
                    error.message.as_deref().or(error.description.as_deref()).unwrap_or("-")
                );
            }
        }
        OutputFormat::Json => println!("{}", job_json(job_id, &job)),
    }

    Ok(())
}

async fn cmd_cancel(cli: &Cli, settings: &Settings, target: &AccountArgs, job_id: &Uuid) -> Result<()> {
    let (client, account) = job_client(cli, settings, target).await?;
    client
        .cancel_job(&account, job_id)
        .await
        .with_context(|| format!("Failed to cancel job {}", job_id))?;

    match cli.format {
        OutputFormat::Text => println!("Requested cancellation of job {}", job_id),
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "status": "cancel_requested",
                "job_id": job_id,
            }));
        }
    }

    Ok(())
}

fn cmd_config(cli: &Cli, settings: &Settings) -> Result<()> {
    let config_path = match &cli.config {
        Some(path) => path.display().to_string(),
        None => config::config_file_path_string(),
    };
    let identity = &settings.identity;
    let set_or_dash = |value: &Option<String>| if value.is_some() { "(set)" } else { "-" };

    match cli.format {
        OutputFormat::Text => {
            println!("Configuration");
            println!("=============");
            println!();
            println!("Config file:      {}", config_path);
            println!("Source:           {}", settings.source);
            println!("Authority host:   {}", identity.authority_host);
            println!("Tenant:           {}", identity.tenant.as_deref().unwrap_or("common (device code only)"));
            println!("Resource:         {}", identity.resource);
            println!("Client id:        {}", identity.client_id.as_deref().unwrap_or("-"));
            println!("Username:         {}", identity.username.as_deref().unwrap_or("-"));
            println!("Password:         {}", set_or_dash(&identity.password));
            println!("Client secret:    {}", set_or_dash(&identity.client_secret));
            println!(
                "Certificate key:  {}",
                identity
                    .certificate_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "-".to_string())
            );
            println!("Account:          {}", settings.analytics.account.as_deref().unwrap_or("-"));
            println!("DNS suffix:       {}", settings.analytics.dns_suffix);
            println!(
                "Poll interval:    {}s (backoff x{}, max {}s, timeout {})",
                format_secs(settings.poll.interval),
                settings.poll.backoff_factor,
                format_secs(settings.poll.max_interval),
                settings
                    .poll
                    .timeout
                    .map(|t| format!("{}s", format_secs(t)))
                    .unwrap_or_else(|| "none".to_string())
            );
            println!();
            println!("Environment variables:");
            for (name, description) in config::ENVIRONMENT_VARIABLES {
                println!("  {:24} - {}", name, description);
            }
            println!();
            println!("Example config.toml:");
            println!();
            println!("{}", config::generate_example_config());
        }
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "config_file": config_path,
                "source": settings.source.to_string(),
                "authority_host": identity.authority_host,
                "tenant": identity.tenant,
                "resource": identity.resource,
                "client_id": identity.client_id,
                "username": identity.username,
                "password_set": identity.password.is_some(),
                "client_secret_set": identity.client_secret.is_some(),
                "certificate_path": identity.certificate_path,
                "account": settings.analytics.account,
                "dns_suffix": settings.analytics.dns_suffix,
                "poll": {
                    "interval_secs": settings.poll.interval.as_secs_f64(),
                    "backoff_factor": settings.poll.backoff_factor,
                    "max_interval_secs": settings.poll.max_interval.as_secs_f64(),
                    "timeout_secs": settings.poll.timeout.map(|t| t.as_secs_f64()),
                },
            }));
        }
    }

    Ok(())
}
