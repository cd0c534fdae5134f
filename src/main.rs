//! The `sifrun` command-line front end (A1): parses argv into a
//! [`sifrun::launcher::LauncherOptions`] or a registry/cache/overlay
//! operation and drives the library from there. Kept thin on purpose: every
//! decision with a testable invariant lives in the library, not here.

use clap::{AppSettings, Parser, Subcommand};
use sifrun::{
    capability::Capability,
    config::Config,
    context::Context,
    error::{ErrorKind, SifError},
    instance::InstanceRegistry,
    launcher::{Action, LaunchOutcome, Launcher, LauncherOptions, NetworkSelection},
    oci_spec::builder::BindMount,
    reference::Reference,
    rootfs::{self, OverlayMode, OverlaySource, OverlaySpec},
    supervisor::Supervisor,
    transport::{self, FetchContext, RegistryAuth},
};
use anyhow::anyhow;
use nix::sys::signal::Signal;
use std::{env, io::Write, path::PathBuf, time::Duration};

#[derive(Parser, Debug)]
#[clap(
    name = "sifrun",
    about = "A container launcher for scientific and high-performance computing workloads",
    global_setting(AppSettings::ColoredHelp)
)]
struct Cli {
    #[clap(flatten)]
    config: Config,

    /// Path to the low-level OCI runtime binary (`runc`, `crun`, ...).
    #[clap(long, env("SIFRUN_RUNTIME"), default_value("runc"), global = true)]
    runtime: PathBuf,

    /// Directory instance records and supervisor run-state live under.
    #[clap(
        long,
        env("SIFRUN_INSTANCES_DIR"),
        default_value("/var/lib/sifrun/instances"),
        global = true
    )]
    instances_dir: PathBuf,

    /// Directory of CNI network configuration files (`*.conf`/`*.conflist`).
    #[clap(long, env("SIFRUN_CNI_CONFIG_DIR"), default_value("/etc/cni/net.d"), global = true)]
    cni_config_dir: PathBuf,

    /// Directory of CNI plugin binaries.
    #[clap(long, env("SIFRUN_CNI_PLUGIN_DIR"), default_value("/opt/cni/bin"), global = true)]
    cni_plugin_dir: PathBuf,

    #[clap(subcommand)]
    command: Command,
}

/// Flags shared by every launch verb (`exec`/`run`/`shell`/`test`/`instance
/// start`/`instance run`).
#[derive(Parser, Debug)]
struct LaunchArgs {
    /// Set an environment variable inside the container (`KEY=VALUE`).
    #[clap(long = "env", short = 'e')]
    env: Vec<String>,

    /// Working directory inside the container.
    #[clap(long, default_value("/"))]
    cwd: String,

    /// Container hostname.
    #[clap(long)]
    hostname: Option<String>,

    /// Make the rootfs itself writable, persisting changes back to the image.
    #[clap(long)]
    writable: bool,

    /// Overlay an ephemeral tmpfs as the writable layer; changes are discarded on exit.
    #[clap(long)]
    writable_tmpfs: bool,

    /// Apply the stricter "compat" containment policy.
    #[clap(long)]
    compat: bool,

    /// Explicitly disable the "compat" containment policy.
    #[clap(long)]
    no_compat: bool,

    /// Run as uid/gid 0 inside a user namespace, with no host privilege granted.
    #[clap(long)]
    fakeroot: bool,

    /// Use a user namespace even when policy permits the setuid path.
    #[clap(long)]
    force_user_namespace: bool,

    /// Grant an additional capability (repeatable), e.g. `--add-cap CAP_NET_ADMIN`.
    #[clap(long = "add-cap")]
    add_capabilities: Vec<Capability>,

    /// Drop a capability (repeatable); a capability both added and dropped is dropped.
    #[clap(long = "drop-cap")]
    drop_capabilities: Vec<Capability>,

    /// Bind-mount an additional host path (repeatable): `SRC:DST[:ro]`.
    #[clap(long = "bind", parse(try_from_str = parse_bind_mount))]
    bind_mounts: Vec<BindMount>,

    /// Stack a writable or read-only overlay source (repeatable, order
    /// matters): `PATH[:ro|:rw]`. At most one `rw` source is allowed, and it
    /// must be given last.
    #[clap(long = "overlay", parse(try_from_str = parse_overlay_source))]
    overlay: Vec<OverlaySource>,

    /// `host` (default, share the host network), `none` (isolated, no CNI),
    /// or a named CNI network (detached instances only).
    #[clap(long = "net", default_value("host"), parse(try_from_str = parse_network))]
    network: NetworkSelection,

    /// Hard memory limit for the container's cgroup, in bytes.
    #[clap(long)]
    memory_limit_bytes: Option<i64>,

    /// Relative CPU share for the container's cgroup.
    #[clap(long)]
    cpu_shares: Option<u64>,

    /// Allow the container process to gain privileges via `execve` (`setuid` binaries, file capabilities).
    #[clap(long)]
    allow_new_privileges: bool,

    /// Restart this instance across host reboots. Only meaningful for `instance start`/`instance run`.
    #[clap(long)]
    boot: bool,
}

impl LaunchArgs {
    fn into_options(self, reference: Reference, action: Action, command: Vec<String>) -> Result<LauncherOptions, SifError> {
        let options = LauncherOptions {
            reference,
            action,
            command,
            env: self.env,
            cwd: self.cwd,
            hostname: self.hostname,
            writable: self.writable,
            writable_tmpfs: self.writable_tmpfs,
            compat: self.compat,
            no_compat: self.no_compat,
            fakeroot: self.fakeroot,
            force_user_namespace: self.force_user_namespace,
            add_capabilities: self.add_capabilities,
            drop_capabilities: self.drop_capabilities,
            bind_mounts: self.bind_mounts,
            overlay: OverlaySpec { sources: self.overlay },
            network: self.network,
            memory_limit_bytes: self.memory_limit_bytes,
            cpu_shares: self.cpu_shares,
            no_new_privileges: !self.allow_new_privileges,
            boot: self.boot,
        };
        options.validate()?;
        Ok(options)
    }
}

fn parse_bind_mount(s: &str) -> Result<BindMount, String> {
    let mut parts = s.splitn(3, ':');
    let source = parts.next().filter(|s| !s.is_empty()).ok_or_else(|| format!("malformed bind mount: {}", s))?;
    let destination = parts.next().ok_or_else(|| format!("bind mount {} is missing a destination (SRC:DST)", s))?;
    let readonly = matches!(parts.next(), Some("ro"));
    Ok(BindMount {
        source: PathBuf::from(source),
        destination: PathBuf::from(destination),
        readonly,
    })
}

fn parse_overlay_source(s: &str) -> Result<OverlaySource, String> {
    let mut parts = s.splitn(2, ':');
    let path = parts.next().filter(|s| !s.is_empty()).ok_or_else(|| format!("malformed overlay source: {}", s))?;
    let mode = match parts.next() {
        Some("rw") => OverlayMode::Rw,
        Some("ro") | None => OverlayMode::Ro,
        Some(other) => return Err(format!("unknown overlay mode '{}': expected ro or rw", other)),
    };
    Ok(OverlaySource {
        path: PathBuf::from(path),
        mode,
    })
}

fn parse_network(s: &str) -> Result<NetworkSelection, String> {
    match s {
        "host" => Ok(NetworkSelection::Host),
        "none" => Ok(NetworkSelection::None),
        name => Ok(NetworkSelection::Named(name.to_string())),
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute a command inside a fresh container.
    Exec {
        image: String,
        #[clap(required = true)]
        command: Vec<String>,
        #[clap(flatten)]
        launch: LaunchArgs,
    },
    /// Run the image's default entrypoint inside a fresh container.
    Run {
        image: String,
        args: Vec<String>,
        #[clap(flatten)]
        launch: LaunchArgs,
    },
    /// Start an interactive shell inside a fresh container.
    Shell {
        image: String,
        #[clap(flatten)]
        launch: LaunchArgs,
    },
    /// Run the image's test script inside a fresh container.
    Test {
        image: String,
        args: Vec<String>,
        #[clap(flatten)]
        launch: LaunchArgs,
    },
    /// Manage named, detached instances.
    Instance {
        #[clap(subcommand)]
        command: InstanceCommand,
    },
    /// Build an image from a build spec.
    Build { target: String, spec: PathBuf },
    /// Pull an image into the local cache.
    Pull { target: String, reference: String },
    /// Push a local image to a remote.
    Push { file: PathBuf, reference: String },
    /// Sign a local image.
    Sign { file: PathBuf },
    /// Verify a local image's signature.
    Verify { file: PathBuf },
    /// Inspect or clean the local image cache.
    Cache {
        #[clap(subcommand)]
        command: CacheCommand,
    },
    /// Create, flush, or seal writable overlay images.
    Overlay {
        #[clap(subcommand)]
        command: OverlayCommand,
    },
    /// Manage configured remote endpoints.
    Remote {
        #[clap(subcommand)]
        command: RemoteCommand,
    },
    /// Read or modify the global policy configuration.
    Config {
        #[clap(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum InstanceCommand {
    /// Start a named, detached instance.
    Start {
        image: String,
        name: String,
        args: Vec<String>,
        #[clap(flatten)]
        launch: LaunchArgs,
    },
    /// Start a named, detached instance, then immediately run a command inside it.
    Run {
        image: String,
        name: String,
        args: Vec<String>,
        #[clap(flatten)]
        launch: LaunchArgs,
    },
    /// Stop one instance by name, or every instance owned by the caller if none is given.
    Stop {
        name: Option<String>,
        /// Seconds to wait for graceful exit before escalating to `SIGKILL`.
        #[clap(long, default_value("10"))]
        timeout_secs: u64,
    },
    /// List live instances owned by the caller.
    List,
    /// Report an instance's recorded metadata.
    Stats { name: String },
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
    /// List materialized artifacts in the local cache.
    List,
    /// Remove every materialized artifact from the local cache.
    Clean,
}

#[derive(Subcommand, Debug)]
enum OverlayCommand {
    /// Create a new ext3 overlay image of the given size.
    Create {
        file: PathBuf,
        #[clap(long, default_value("1024"))]
        size_mb: u64,
    },
    /// Flush a writable overlay image's contents to durable storage.
    Sync { file: PathBuf },
    /// Mark an overlay image read-only.
    Seal { file: PathBuf },
}

#[derive(Subcommand, Debug)]
enum RemoteCommand {
    /// List configured remote endpoints.
    List,
    /// Log in to a remote endpoint.
    Login { name: String },
    /// Log out of a remote endpoint.
    Logout { name: String },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Inspect or modify the global `key = value` policy file.
    Global {
        #[clap(long, conflicts_with_all = &["unset", "reset"])]
        set: bool,
        #[clap(long, conflicts_with_all = &["set", "reset"])]
        unset: bool,
        #[clap(long, conflicts_with_all = &["set", "unset"])]
        reset: bool,
        directive: Option<String>,
        value: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = set_logging_verbosity(cli.config.log_level()) {
        eprintln!("failed to initialize logging: {}", e);
    }

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            log::error!("{}", e.chain());
            e.kind().exit_code()
        }
    };
    std::process::exit(code);
}

/// Initialize the logger and set its verbosity from `-l/--log-level`.
fn set_logging_verbosity(level: log::LevelFilter) -> anyhow::Result<()> {
    env::set_var("RUST_LOG", level.to_string());
    env_logger::builder()
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {:<5} {}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .try_init()
        .map_err(|e| anyhow!("init env logger: {}", e))
}

fn current_user() -> String {
    env::var("USER").unwrap_or_else(|_| nix::unistd::Uid::current().to_string())
}

async fn run(cli: Cli) -> Result<i32, SifError> {
    let ctx = Context::new(
        cli.config,
        cli.runtime,
        cli.instances_dir,
        cli.cni_config_dir,
        cli.cni_plugin_dir,
    )?;
    let user = current_user();

    match cli.command {
        Command::Exec { image, command, launch } => {
            launch_foreground(&ctx, &user, Action::Exec, &image, command, launch).await
        }
        Command::Run { image, args, launch } => launch_foreground(&ctx, &user, Action::Run, &image, args, launch).await,
        Command::Shell { image, launch } => {
            launch_foreground(&ctx, &user, Action::Shell, &image, vec!["/bin/sh".to_string()], launch).await
        }
        Command::Test { image, args, launch } => launch_foreground(&ctx, &user, Action::Test, &image, args, launch).await,
        Command::Instance { command } => instance_command(&ctx, &user, command).await,
        Command::Build { .. } => Err(unsupported("build")),
        Command::Pull { target, reference } => pull_command(&ctx, &target, &reference).await,
        Command::Push { .. } => Err(unsupported("push")),
        Command::Sign { .. } => Err(unsupported("sign")),
        Command::Verify { .. } => Err(unsupported("verify")),
        Command::Cache { command } => cache_command(&ctx, command),
        Command::Overlay { command } => overlay_command(command).await,
        Command::Remote { .. } => Err(unsupported("remote")),
        Command::Config { command: ConfigCommand::Global { .. } } => Err(unsupported("config global")),
    }
}

fn unsupported(what: &str) -> SifError {
    SifError::new(ErrorKind::Unsupported, anyhow!("`{}` is not implemented by this build", what))
}

async fn launch_foreground(
    ctx: &Context,
    user: &str,
    action: Action,
    image: &str,
    command: Vec<String>,
    launch: LaunchArgs,
) -> Result<i32, SifError> {
    let reference = Reference::parse(image)?;
    let options = launch.into_options(reference, action, command)?;
    let outcome = Launcher::new(ctx).run(user, options).await?;
    match outcome {
        LaunchOutcome::Exited(code) => Ok(code),
        LaunchOutcome::InstanceStarted { name, pid } => {
            log::info!("instance {} started with pid {}", name, pid);
            Ok(0)
        }
    }
}

async fn instance_command(ctx: &Context, user: &str, command: InstanceCommand) -> Result<i32, SifError> {
    match command {
        InstanceCommand::Start { image, name, args, launch } => {
            let reference = Reference::parse(&image)?;
            let options = launch.into_options(reference, Action::InstanceStart { name: name.clone() }, args)?;
            match Launcher::new(ctx).run(user, options).await? {
                LaunchOutcome::InstanceStarted { pid, .. } => {
                    println!("instance {} started with pid {}", name, pid);
                    Ok(0)
                }
                LaunchOutcome::Exited(code) => Ok(code),
            }
        }
        InstanceCommand::Run { image, name, args, launch } => {
            let reference = Reference::parse(&image)?;
            let start_options = launch.into_options(reference, Action::InstanceStart { name: name.clone() }, vec![])?;
            Launcher::new(ctx).run(user, start_options).await?;

            let join_options = LauncherOptions {
                reference: Reference::Instance(name),
                ..base_join_options(args)
            };
            match Launcher::new(ctx).run(user, join_options).await? {
                LaunchOutcome::Exited(code) => Ok(code),
                LaunchOutcome::InstanceStarted { .. } => Ok(0),
            }
        }
        InstanceCommand::Stop { name, timeout_secs } => {
            let mut registry = InstanceRegistry::open(&ctx.instances_dir)?;
            let names = match name {
                Some(name) => vec![name],
                None => registry.list(Some(user))?.into_iter().map(|r| r.name().clone()).collect(),
            };
            for name in &names {
                if let Some(record) = registry.get(user, name)? {
                    if let (Some(network_name), Some(netns_path)) =
                        (record.cni_network().as_ref(), record.namespace_pins().net.as_ref())
                    {
                        if let Err(e) = Supervisor::teardown_network(
                            &ctx.cni_config_dir,
                            &ctx.cni_plugin_dir,
                            network_name,
                            name,
                            netns_path,
                        )
                        .await
                        {
                            log::warn!("CNI teardown for instance {} failed: {}", name, e.chain());
                        }
                    }
                }
                registry
                    .stop(user, name, Signal::SIGTERM, Duration::from_secs(timeout_secs))
                    .await?;
                println!("stopped {}", name);
            }
            Ok(0)
        }
        InstanceCommand::List => {
            let mut registry = InstanceRegistry::open(&ctx.instances_dir)?;
            for record in registry.list(Some(user))? {
                println!(
                    "{}\t{}\t{}",
                    record.name(),
                    record.container_pid().unwrap_or(*record.supervisor_pid()),
                    if *record.boot() { "boot" } else { "-" }
                );
            }
            Ok(0)
        }
        InstanceCommand::Stats { name } => {
            let registry = InstanceRegistry::open(&ctx.instances_dir)?;
            let record = registry
                .get(user, &name)?
                .ok_or_else(|| SifError::new(ErrorKind::InstanceMissing, anyhow!("no such instance: {}", name)))?;
            println!("{:#?}", record);
            Ok(0)
        }
    }
}

async fn pull_command(ctx: &Context, target: &str, reference: &str) -> Result<i32, SifError> {
    let reference = Reference::parse(reference)?;
    let fetch_ctx = FetchContext {
        auth: RegistryAuth::from_env(),
    };
    let path = transport::pull(&fetch_ctx, &reference, &ctx.cache).await?;
    println!("pulled {} to {}", target, path.display());
    Ok(0)
}

fn cache_command(ctx: &Context, command: CacheCommand) -> Result<i32, SifError> {
    match command {
        CacheCommand::List => {
            for entry in ctx.cache.list()? {
                println!("{}\t{}\t{}", entry.fingerprint(), entry.size(), entry.path().display());
            }
            Ok(0)
        }
        CacheCommand::Clean => {
            let removed = ctx.cache.clean()?;
            println!("removed {} cached artifact(s)", removed);
            Ok(0)
        }
    }
}

async fn overlay_command(command: OverlayCommand) -> Result<i32, SifError> {
    match command {
        OverlayCommand::Create { file, size_mb } => {
            rootfs::create_overlay_image(&file, size_mb).await?;
            println!("created {} ({} MiB)", file.display(), size_mb);
            Ok(0)
        }
        OverlayCommand::Sync { file } => {
            rootfs::sync_overlay_image(&file)?;
            Ok(0)
        }
        OverlayCommand::Seal { file } => {
            rootfs::seal_overlay_image(&file)?;
            Ok(0)
        }
    }
}

fn base_join_options(command: Vec<String>) -> LauncherOptions {
    LauncherOptions {
        reference: Reference::Dir(String::new()),
        action: Action::Exec,
        command,
        env: vec![],
        cwd: "/".to_string(),
        hostname: None,
        writable: false,
        writable_tmpfs: false,
        compat: false,
        no_compat: false,
        fakeroot: false,
        force_user_namespace: false,
        add_capabilities: vec![],
        drop_capabilities: vec![],
        bind_mounts: vec![],
        overlay: OverlaySpec::default(),
        network: NetworkSelection::Host,
        memory_limit_bytes: None,
        cpu_shares: None,
        no_new_privileges: true,
        boot: false,
    }
}
