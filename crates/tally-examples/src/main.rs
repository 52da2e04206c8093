use facet::Facet;
use figue as args;

mod cache;
mod scenarios;

type AnyResult<T> = Result<T, String>;

#[derive(Facet, Debug)]
struct Cli {
    #[facet(flatten)]
    builtins: args::FigueBuiltins,
    #[facet(args::subcommand)]
    command: CommandKind,
}

#[derive(Facet, Debug)]
#[repr(u8)]
enum CommandKind {
    FinalizerRace {
        #[facet(args::named, default)]
        rounds: Option<u64>,
    },
    GetOrCreate {
        #[facet(args::named, default)]
        callers: Option<u64>,
        #[facet(args::named, default)]
        keys: Option<u64>,
    },
    Stress {
        #[facet(args::named, default)]
        threads: Option<u64>,
        #[facet(args::named, default)]
        rounds: Option<u64>,
    },
    Snapshot,
}

const DEFAULT_FINALIZER_ROUNDS: u64 = 10_000;
const DEFAULT_CALLERS: u64 = 32;
const DEFAULT_KEYS: u64 = 4;
const DEFAULT_THREADS: u64 = 8;
const DEFAULT_STRESS_ROUNDS: u64 = 500;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

async fn run() -> AnyResult<()> {
    let cli = parse_cli()?;
    dispatch_command(cli.command).await
}

fn parse_cli() -> AnyResult<Cli> {
    let figue_config = args::builder::<Cli>()
        .map_err(|e| format!("failed to build CLI schema: {e}"))?
        .cli(|cli| cli.strict())
        .help(|h| {
            h.program_name("tally-examples")
                .description("Run instance registry scenarios as subcommands")
                .version(option_env!("CARGO_PKG_VERSION").unwrap_or("dev"))
        })
        .build();

    args::Driver::new(figue_config)
        .run()
        .into_result()
        .map(|v| v.value)
        .map_err(|e| e.to_string())
}

async fn dispatch_command(command: CommandKind) -> AnyResult<()> {
    match command {
        CommandKind::FinalizerRace { rounds } => {
            scenarios::finalizer_race::run(rounds.unwrap_or(DEFAULT_FINALIZER_ROUNDS)).await
        }
        CommandKind::GetOrCreate { callers, keys } => {
            scenarios::get_or_create::run(
                callers.unwrap_or(DEFAULT_CALLERS),
                keys.unwrap_or(DEFAULT_KEYS),
            )
            .await
        }
        CommandKind::Stress { threads, rounds } => {
            scenarios::stress::run(
                threads.unwrap_or(DEFAULT_THREADS),
                rounds.unwrap_or(DEFAULT_STRESS_ROUNDS),
            )
            .await
        }
        CommandKind::Snapshot => scenarios::snapshot::run(),
    }
}
