use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use td_2048::agent::{Action, Agent, BaselinePlayer, RandomEnv, TdPlayer};
use td_2048::engine::{fib, Board, Cell, Move};
use td_2048::trace;

#[derive(Parser, Debug)]
#[command(
    name = "td-2048",
    version,
    about = "Self-play training and evaluation for Fibonacci 2048"
)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train the TD learner by self-play
    Train {
        /// Number of self-play episodes
        #[arg(short = 'n', long, default_value_t = 1000)]
        episodes: u64,
        /// TD step size (0 disables learning)
        #[arg(long, default_value_t = 0.003)]
        alpha: f32,
        /// Start from an existing weight bank instead of zeroed tables
        #[arg(long, value_name = "FILE")]
        load: Option<PathBuf>,
        /// Write the weight bank here when training finishes
        #[arg(long, value_name = "FILE")]
        save: Option<PathBuf>,
        /// Seed for the tile environment (entropy-seeded when absent)
        #[arg(long)]
        seed: Option<u64>,
        /// Episodes per summary line
        #[arg(long, default_value_t = 1000)]
        block: u64,
        /// Record every episode as a replay file in this directory
        #[arg(long, value_name = "DIR")]
        record: Option<PathBuf>,
    },
    /// Run a heuristic baseline player
    Play {
        /// Move selection rule: random, score, space, monotonic, corner
        #[arg(long, default_value = "random")]
        policy: String,
        /// Number of episodes
        #[arg(short = 'n', long, default_value_t = 100)]
        episodes: u64,
        /// Seed for both the player and the tile environment
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Inspect a recorded episode
    Replay {
        /// Replay file written by `train --record`
        file: PathBuf,
        /// Print every board along the way, not just the summary
        #[arg(long)]
        boards: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Train { episodes, alpha, load, save, seed, block, record } => {
            train(episodes, alpha, load, save, seed, block, record)
        }
        Command::Play { policy, episodes, seed } => play(&policy, episodes, seed),
        Command::Replay { file, boards } => replay(&file, boards),
    }
}

struct EpisodeOutcome {
    score: u64,
    steps: u32,
    highest: Cell,
    states: Vec<[Cell; 16]>,
    moves: Vec<u8>,
    rewards: Vec<i32>,
}

/// Play one episode to completion: the environment opens with two tiles,
/// then player and environment alternate until no slide is legal.
fn run_episode<A: Agent>(player: &mut A, env: &mut RandomEnv, record: bool) -> EpisodeOutcome {
    let mut board = Board::EMPTY;
    env.take_action(&board).apply(&mut board);
    env.take_action(&board).apply(&mut board);

    let mut out = EpisodeOutcome {
        score: 0,
        steps: 0,
        highest: 0,
        states: Vec::new(),
        moves: Vec::new(),
        rewards: Vec::new(),
    };

    player.open_episode("~start");
    env.open_episode("~start");
    loop {
        if record {
            out.states.push(board.cells());
        }
        let action = player.take_action(&board);
        let Action::Slide(dir) = action else { break };
        let reward = action.apply(&mut board);
        out.score += reward as u64;
        out.steps += 1;
        if record {
            out.moves.push(dir.opcode());
            out.rewards.push(reward);
        }
        env.take_action(&board).apply(&mut board);
    }
    player.close_episode("~end");
    env.close_episode("~end");

    out.highest = board.cells().into_iter().max().unwrap_or(0);
    out
}

struct StatBlock {
    count: u64,
    score_sum: u64,
    score_max: u64,
    best_cell: Cell,
}

impl StatBlock {
    fn new() -> Self {
        StatBlock { count: 0, score_sum: 0, score_max: 0, best_cell: 0 }
    }

    fn record(&mut self, outcome: &EpisodeOutcome) {
        self.count += 1;
        self.score_sum += outcome.score;
        self.score_max = self.score_max.max(outcome.score);
        self.best_cell = self.best_cell.max(outcome.highest);
    }

    fn summary(&self, episode: u64) -> String {
        let avg = self.score_sum as f64 / self.count.max(1) as f64;
        format!(
            "{:>8}  avg = {:>9.1}  max = {:>8}  best face = {}",
            episode,
            avg,
            self.score_max,
            fib(self.best_cell)
        )
    }
}

fn episode_progress(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} episodes ({eta})",
        )
        .unwrap()
        .progress_chars("=>-"),
    );
    pb
}

#[allow(clippy::too_many_arguments)]
fn train(
    episodes: u64,
    alpha: f32,
    load: Option<PathBuf>,
    save: Option<PathBuf>,
    seed: Option<u64>,
    block: u64,
    record: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut args = format!("alpha={}", alpha);
    match &load {
        Some(path) => args.push_str(&format!(" load={}", path.display())),
        None => args.push_str(" init=4x24"),
    }
    if let Some(path) = &save {
        args.push_str(&format!(" save={}", path.display()));
    }
    let mut player = TdPlayer::new(&args).context("configuring the learner")?;

    let env_args = seed.map(|s| format!("seed={}", s)).unwrap_or_default();
    let mut env = RandomEnv::new(&env_args).context("configuring the environment")?;

    if let Some(dir) = &record {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating record directory {}", dir.display()))?;
    }

    let pb = episode_progress(episodes);
    let mut stats = StatBlock::new();
    for ep in 1..=episodes {
        let start_unix = trace::now_unix_seconds();
        let started = Instant::now();
        let outcome = run_episode(&mut player, &mut env, record.is_some());
        stats.record(&outcome);

        if let Some(dir) = &record {
            let meta = trace::Meta {
                steps: outcome.steps,
                start_unix_s: start_unix,
                elapsed_s: started.elapsed().as_secs_f32(),
                final_score: outcome.score,
                highest_face: fib(outcome.highest),
                agent_str: Some(format!("{} alpha={}", player.name(), alpha)),
            };
            let path = dir.join(format!("ep-{:06}.f2run", ep));
            trace::write_episode_to_path(&path, &meta, &outcome.states, &outcome.moves, &outcome.rewards)
                .with_context(|| format!("writing {}", path.display()))?;
        }

        if ep % block == 0 {
            pb.println(stats.summary(ep));
            stats = StatBlock::new();
        }
        pb.inc(1);
    }
    pb.finish_and_clear();
    if stats.count > 0 {
        println!("{}", stats.summary(episodes));
    }

    // dropping the player writes the bank when save= was given
    drop(player);
    if let Some(path) = &save {
        eprintln!("weights saved to {}", path.display());
    }
    Ok(())
}

fn play(policy: &str, episodes: u64, seed: Option<u64>) -> anyhow::Result<()> {
    let mut args = format!("mode={}", policy);
    if let Some(s) = seed {
        args.push_str(&format!(" seed={}", s));
    }
    let mut player = BaselinePlayer::new(&args).context("configuring the baseline")?;
    let env_args = seed.map(|s| format!("seed={}", s.wrapping_add(1))).unwrap_or_default();
    let mut env = RandomEnv::new(&env_args).context("configuring the environment")?;

    let pb = episode_progress(episodes);
    let mut stats = StatBlock::new();
    for _ in 0..episodes {
        let outcome = run_episode(&mut player, &mut env, false);
        stats.record(&outcome);
        pb.inc(1);
    }
    pb.finish_and_clear();
    println!("{}", stats.summary(episodes));
    Ok(())
}

fn replay(file: &Path, boards: bool) -> anyhow::Result<()> {
    let episode = trace::parse_episode_file(file)
        .with_context(|| format!("reading {}", file.display()))?;

    println!("steps:        {}", episode.meta.steps);
    println!("score:        {}", episode.meta.final_score);
    println!("highest face: {}", episode.meta.highest_face);
    println!("elapsed:      {:.2}s", episode.meta.elapsed_s);
    if let Some(agent) = &episode.meta.agent_str {
        println!("agent:        {}", agent);
    }

    if boards {
        for i in 0..episode.moves.len() {
            println!("{}", Board::from_cells(episode.states[i]));
            println!(
                "#{} {:?}, reward {}",
                i + 1,
                Move::from_opcode(episode.moves[i]),
                episode.rewards[i]
            );
        }
        if let Some(last) = episode.states.last() {
            println!("{}", Board::from_cells(*last));
        }
    }
    Ok(())
}
