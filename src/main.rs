use std::{error::Error, sync::Arc, time::Duration};

use clap::{Args, Parser, Subcommand};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use cube::config::{Capacity, Config};
use cube::manager::{
    HttpWorker, LocalWorker, Manager, ManagerServer, WorkerClient, run_reconciler, run_scheduler,
};
use cube::scheduler::SchedulerKind;
use cube::tasks::docker::DockerRuntime;
use cube::worker::{TaskServer, Worker, run_tasks};

#[derive(Parser, Debug)]
#[command(name = "cube")]
#[command(version)]
#[command(about = "A minimal container orchestrator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a worker that executes tasks on the local Docker engine
    Worker(WorkerArgs),

    /// Run a manager that places tasks on remote workers
    Manager(ManagerArgs),

    /// Run a manager and a single worker in one process
    Local(LocalArgs),
}

#[derive(Args, Debug)]
struct WorkerArgs {
    #[arg(long, default_value = "worker-1")]
    name: String,

    #[arg(long, default_value = "0.0.0.0")]
    address: String,

    #[arg(long, default_value = "5556")]
    port: u16,

    #[command(flatten)]
    capacity: CapacityArgs,

    #[command(flatten)]
    timing: TimingArgs,
}

#[derive(Args, Debug)]
struct ManagerArgs {
    #[arg(long, default_value = "0.0.0.0")]
    address: String,

    #[arg(long, default_value = "5555")]
    port: u16,

    /// Worker addresses (comma-separated, format: "host:port")
    #[arg(long, value_delimiter = ',', required = true)]
    workers: Vec<String>,

    #[command(flatten)]
    timing: TimingArgs,
}

#[derive(Args, Debug)]
struct LocalArgs {
    #[arg(long, default_value = "127.0.0.1")]
    address: String,

    #[arg(long, default_value = "5555")]
    port: u16,

    #[command(flatten)]
    capacity: CapacityArgs,

    #[command(flatten)]
    timing: TimingArgs,
}

#[derive(Args, Debug)]
struct CapacityArgs {
    /// Memory offered to tasks in MiB (defaults to host memory)
    #[arg(long)]
    memory: Option<u64>,

    /// Disk offered to tasks in GiB (defaults to free host disk)
    #[arg(long)]
    disk: Option<u64>,

    /// CPU cores offered to tasks (defaults to host cores)
    #[arg(long)]
    cpu: Option<f64>,
}

impl CapacityArgs {
    fn resolve(&self) -> Capacity {
        let detected = Capacity::detect();
        Capacity::new(
            self.memory.unwrap_or(detected.memory),
            self.disk.unwrap_or(detected.disk),
            self.cpu.unwrap_or(detected.cpu),
        )
    }
}

#[derive(Args, Debug)]
struct TimingArgs {
    #[arg(long, default_value = "5")]
    schedule_interval_secs: u64,

    #[arg(long, default_value = "15")]
    reconcile_interval_secs: u64,

    #[arg(long, default_value = "2")]
    poll_interval_secs: u64,

    #[arg(long, default_value = "120")]
    runtime_timeout_secs: u64,

    #[arg(long, default_value = "60")]
    grace_period_secs: u64,

    #[arg(long, default_value = "least-loaded")]
    scheduler: SchedulerKind,
}

impl TimingArgs {
    fn config(&self, capacity: Capacity) -> Config {
        Config {
            schedule_interval: Duration::from_secs(self.schedule_interval_secs),
            reconcile_interval: Duration::from_secs(self.reconcile_interval_secs),
            worker_poll_interval: Duration::from_secs(self.poll_interval_secs),
            runtime_timeout: Duration::from_secs(self.runtime_timeout_secs),
            worker_grace_period: Duration::from_secs(self.grace_period_secs),
            scheduler: self.scheduler,
            capacity,
        }
    }
}

fn spawn_worker(config: &Config, name: String) -> Result<Arc<Worker>, Box<dyn Error>> {
    let runtime = DockerRuntime::connect()?;
    Ok(Arc::new(Worker::from_config(name, config, Arc::new(runtime))))
}

fn spawn_manager_loops(manager: &Arc<Manager>, config: &Config, shutdown: &watch::Receiver<bool>) {
    tokio::spawn(run_scheduler(
        manager.clone(),
        config.schedule_interval,
        shutdown.clone(),
    ));
    tokio::spawn(run_reconciler(
        manager.clone(),
        config.reconcile_interval,
        shutdown.clone(),
    ));
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let server = match cli.command {
        Command::Worker(args) => {
            let config = args.timing.config(args.capacity.resolve());
            let worker = spawn_worker(&config, args.name)?;
            tracing::info!(worker = %worker.name, capacity = ?worker.capacity(), "Worker starting");

            tokio::spawn(run_tasks(
                worker.clone(),
                config.worker_poll_interval,
                shutdown_rx.clone(),
            ));
            tokio::spawn(TaskServer::new(worker, &args.address, args.port).start_server())
        }
        Command::Manager(args) => {
            let config = args.timing.config(Capacity::default());
            let manager = Arc::new(Manager::from_config(&config));
            for address in args.workers {
                let client: Arc<dyn WorkerClient> = Arc::new(HttpWorker::new(address));
                manager.register_worker(client).await;
            }
            tracing::info!(scheduler = %config.scheduler, "Manager starting");

            spawn_manager_loops(&manager, &config, &shutdown_rx);
            tokio::spawn(ManagerServer::new(manager, &args.address, args.port).start_server())
        }
        Command::Local(args) => {
            let config = args.timing.config(args.capacity.resolve());
            let worker = spawn_worker(&config, "local".to_string())?;
            let manager = Arc::new(Manager::from_config(&config));
            manager
                .register_worker(Arc::new(LocalWorker::new(worker.clone())))
                .await;

            tokio::spawn(run_tasks(
                worker,
                config.worker_poll_interval,
                shutdown_rx.clone(),
            ));
            spawn_manager_loops(&manager, &config, &shutdown_rx);
            tokio::spawn(ManagerServer::new(manager, &args.address, args.port).start_server())
        }
    };

    tokio::select! {
        result = server => {
            result??;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
        }
    }

    let _ = shutdown_tx.send(true);
    Ok(())
}
