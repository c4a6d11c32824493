//! Binary entry point for the RigStack CLI.

use std::io::{self, Write};
use std::process;

use camino::Utf8PathBuf;
use clap::Parser;
use thiserror::Error;

use rigstack::{
    AwsDriver, AwsIntent, ConfigError, EngineConfig, PaperspaceClient, PaperspaceConfig,
    PaperspaceError, PaperspaceIntent, ProvisionPlan, PulumiEngine, PulumiError, SshKeySource,
    StackError, WorkflowError, logging,
    paperspace::{ControlPlane, Machine},
    workflow::{resolve_aws_config, resolve_paperspace_plan},
};

mod cli;

use cli::{
    AwsCommand, AwsUpCommand, Cli, PaperspaceCommand, PaperspaceResolveCommand, ProviderCommand,
    StackNameArgs,
};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error(transparent)]
    Paperspace(#[from] PaperspaceError),
    #[error("{message}")]
    Stack { message: String, retryable: bool },
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

impl From<StackError<PulumiError>> for CliError {
    fn from(err: StackError<PulumiError>) -> Self {
        Self::Stack {
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let exit_code = match dispatch(cli.command).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

async fn dispatch(command: ProviderCommand) -> Result<(), CliError> {
    match command {
        ProviderCommand::Aws(AwsCommand::Up(args)) => aws_up(args).await,
        ProviderCommand::Aws(AwsCommand::Destroy(args)) => aws_destroy(args).await,
        ProviderCommand::Paperspace(PaperspaceCommand::List(args)) => {
            let client = paperspace_client(args.api_key.as_deref())?;
            client.auth_session().await?;
            let machines = client.list_machines().await?;
            write_machines(io::stdout().lock(), &machines)
        }
        ProviderCommand::Paperspace(PaperspaceCommand::Resolve(args)) => {
            paperspace_resolve(args).await
        }
    }
}

fn aws_intent(args: AwsUpCommand) -> AwsIntent {
    let ssh_key = match (args.ssh_key_file, args.ssh_key) {
        (Some(path), _) => SshKeySource::File(Utf8PathBuf::from(path)),
        (None, inline) => SshKeySource::Inline(inline.unwrap_or_default()),
    };
    AwsIntent {
        region: args.region,
        instance_type: args.instance_type,
        root_volume_size_gb: args.root_volume_size,
        public_ip_type: args.public_ip_type,
        ssh_key,
    }
}

fn aws_driver(name: &str) -> Result<AwsDriver<PulumiEngine>, CliError> {
    let engine_config = EngineConfig::load_without_cli_args()?;
    let engine = PulumiEngine::new(&engine_config)?;
    Ok(AwsDriver::new(engine, name)?)
}

async fn aws_up(args: AwsUpCommand) -> Result<(), CliError> {
    let name = args.name.clone();
    let config = resolve_aws_config(&aws_intent(args))?;
    let driver = aws_driver(&name)?;
    driver.set_config(&config).await?;
    let output = driver.apply().await?;

    let mut stdout = io::stdout().lock();
    writeln!(stdout, "instanceId: {}", output.instance_id)?;
    writeln!(stdout, "publicIp: {}", output.public_ip)?;
    Ok(())
}

async fn aws_destroy(args: StackNameArgs) -> Result<(), CliError> {
    let driver = aws_driver(&args.name)?;
    driver.destroy().await?;
    writeln!(io::stdout().lock(), "destroyed {}", driver.identity())?;
    Ok(())
}

fn paperspace_client(api_key: Option<&str>) -> Result<PaperspaceClient, CliError> {
    let config = PaperspaceConfig::load_without_cli_args()?;
    Ok(PaperspaceClient::from_config(&config, api_key)?)
}

async fn paperspace_resolve(args: PaperspaceResolveCommand) -> Result<(), CliError> {
    let intent = PaperspaceIntent {
        existing_machine: args.existing,
        machine_type: args.machine_type,
        disk_size_gb: args.disk_size,
        public_ip_type: args.public_ip_type,
        region: args.region,
    };
    let plan = if intent.existing_machine.is_some() {
        let client = paperspace_client(args.auth.api_key.as_deref())?;
        resolve_paperspace_plan(&client, &intent).await?
    } else {
        ProvisionPlan::Create(rigstack::workflow::paperspace_create_args(&intent)?)
    };
    write_plan(io::stdout().lock(), &plan)
}

fn write_machines(mut target: impl Write, machines: &[Machine]) -> Result<(), CliError> {
    for machine in machines {
        writeln!(
            target,
            "{}\t{}\t{}",
            machine.id,
            machine.name,
            machine.public_address().unwrap_or("-")
        )?;
    }
    Ok(())
}

fn write_plan(mut target: impl Write, plan: &ProvisionPlan) -> Result<(), CliError> {
    match plan {
        ProvisionPlan::UseExisting(machine) => {
            writeln!(target, "existing machine {}", machine.machine_id)?;
            writeln!(target, "publicIp: {}", machine.public_ip)?;
        }
        ProvisionPlan::Create(create) => {
            writeln!(target, "new machine {}", create.machine_type)?;
            writeln!(target, "region: {}", create.region)?;
            writeln!(target, "diskSizeGB: {}", create.disk_size_gb)?;
            writeln!(target, "publicIpType: {}", create.public_ip_type)?;
        }
    }
    Ok(())
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
    if matches!(err, CliError::Stack { retryable: true, .. }) {
        writeln!(target, "the engine reported a transient failure; retrying may succeed").ok();
    }
}
