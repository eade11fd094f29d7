use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    clock::{Clock, SystemClock},
    config::load_settings,
    decision::{ChannelDecisionMaker, CreationDecision, DecisionPrompt, Selection},
    enumerator::discover_all,
    error::ActionFailure,
    session::StaticWallet,
    types::{ActionRequest, ActionResult},
    view_cache::LocalView,
    ZombieClient,
};
use shared::domain::{Address, ChainId, KittyId, KittyRecord, RegistryKind, ZombieId, ZombieRecord};
use tokio::{
    io::{AsyncBufReadExt, BufReader, Lines, Stdin},
    sync::mpsc,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Cli {
    /// Unlocked node account used for reads and submits.
    #[arg(long)]
    address: String,
    #[arg(long, default_value = "5777")]
    chain_id: String,
    /// Overrides the configured node endpoint.
    #[arg(long)]
    rpc_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Zombies,
    Kitties {
        /// List every kitty in the registry, not just the account's.
        #[arg(long)]
        all: bool,
    },
    CreateZombie {
        #[arg(long, default_value = "webzombie")]
        name: String,
    },
    CreateKitty {
        #[arg(long)]
        genes: Option<u64>,
    },
    LevelUp {
        zombie_id: u64,
    },
    Feed {
        zombie_id: u64,
        #[arg(long)]
        kitty: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();

    let mut settings = load_settings()?;
    if let Some(rpc_url) = cli.rpc_url {
        settings.rpc_url = rpc_url;
        settings.validate()?;
    }
    let address = Address::parse(&cli.address).context("invalid --address")?;
    let wallet = StaticWallet::new(address, ChainId(cli.chain_id));
    let client = ZombieClient::initialize(settings, &wallet).await?;

    match cli.command {
        Command::Zombies => {
            let view = client.refresh(RegistryKind::Zombie).await?;
            print_zombies(&view, now());
        }
        Command::Kitties { all: false } => {
            let view = client.refresh(RegistryKind::Kitty).await?;
            print_kitties(&view.kitties);
        }
        Command::Kitties { all: true } => {
            let gateway = client.gateway().await?;
            let discovery =
                discover_all::<KittyRecord>(gateway.as_ref(), client.settings().probe_max_attempts)
                    .await?;
            print_kitties(&discovery.records);
            if discovery.stop.bound_reached() {
                println!(
                    "(stopped after {} ids; raise probe_max_attempts to see more)",
                    discovery.stop.probed()
                );
            }
        }
        Command::CreateZombie { name } => {
            run_action(&client, ActionRequest::CreateZombie { name }).await?;
        }
        Command::CreateKitty { genes } => {
            run_action(&client, ActionRequest::CreateKitty { genes }).await?;
        }
        Command::LevelUp { zombie_id } => {
            let zombie_id = ZombieId(zombie_id);
            run_action(&client, ActionRequest::LevelUp { zombie_id }).await?;
        }
        Command::Feed { zombie_id, kitty } => {
            let request = ActionRequest::FeedOnKitty {
                zombie_id: ZombieId(zombie_id),
                kitty_id: kitty.map(KittyId),
            };
            run_action(&client, request).await?;
        }
    }

    Ok(())
}

async fn run_action(client: &ZombieClient, request: ActionRequest) -> Result<()> {
    let (decisions, prompts) = ChannelDecisionMaker::new(1);
    let prompter = tokio::spawn(answer_prompts(prompts));

    let result = client.perform_action(request, &decisions).await;
    drop(decisions);
    let _ = prompter.await;

    match result {
        ActionResult::Succeeded(success) => {
            println!(
                "{} confirmed tx={} fee={} wei",
                success.kind, success.receipt.tx_hash, success.receipt.fee_paid
            );
            if !success.view_reconciled {
                println!("(view refresh failed; showing last known state)");
            }
            print_zombies(&success.view, now());
            Ok(())
        }
        ActionResult::Failed(ActionFailure::Cancelled) => {
            println!("cancelled");
            Ok(())
        }
        ActionResult::Failed(failure) => Err(failure.into()),
    }
}

async fn answer_prompts(mut prompts: mpsc::Receiver<DecisionPrompt>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(prompt) = prompts.recv().await {
        match prompt {
            DecisionPrompt::SelectTarget { candidates, reply } => {
                println!("Kitties available to feed on:");
                print_kitties(&candidates);
                println!("Enter a kitty id (blank to cancel):");
                let selection = match read_line(&mut lines).await {
                    Some(line) => parse_selection(&line, &candidates),
                    None => Selection::Cancelled,
                };
                let _ = reply.send(selection);
            }
            DecisionPrompt::OfferCreation { reply } => {
                println!("No kitties found. Create one now? [y/N]");
                let decision = match read_line(&mut lines).await {
                    Some(line) if line.trim().eq_ignore_ascii_case("y") => {
                        CreationDecision::Create { genes: None }
                    }
                    _ => CreationDecision::Decline,
                };
                let _ = reply.send(decision);
            }
        }
    }
}

async fn read_line(lines: &mut Lines<BufReader<Stdin>>) -> Option<String> {
    match lines.next_line().await {
        Ok(line) => line,
        Err(err) => {
            info!("prompt: stdin closed: {err}");
            None
        }
    }
}

fn parse_selection(line: &str, candidates: &[KittyRecord]) -> Selection {
    match line.trim().parse::<u64>() {
        Ok(id) if candidates.iter().any(|kitty| kitty.id.0 == id) => {
            Selection::Chosen(KittyId(id))
        }
        _ => Selection::Cancelled,
    }
}

fn now() -> i64 {
    SystemClock.now()
}

fn print_zombies(view: &LocalView, now: i64) {
    if view.zombies.is_empty() {
        println!("no zombies");
        return;
    }
    for zombie in &view.zombies {
        println!("{}", describe_zombie(zombie, now));
    }
}

fn describe_zombie(zombie: &ZombieRecord, now: i64) -> String {
    let readiness = if zombie.is_on_cooldown(now) {
        format!("ready in {}s", zombie.cooldown_remaining(now))
    } else {
        "ready".to_string()
    };
    format!(
        "zombie #{} {} level={} dna={:016} wins={} losses={} {}",
        zombie.id,
        zombie.name,
        zombie.level,
        zombie.dna,
        zombie.win_count,
        zombie.loss_count,
        readiness
    )
}

fn print_kitties(kitties: &[KittyRecord]) {
    if kitties.is_empty() {
        println!("no kitties");
        return;
    }
    for kitty in kitties {
        println!(
            "kitty #{} genes={} generation={}",
            kitty.id, kitty.genes, kitty.generation
        );
    }
}
