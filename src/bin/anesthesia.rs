// Anesthesia dose recommender CLI
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::io;
use std::path::PathBuf;

use anesthesia_rl::config::AppConfig;
use anesthesia_rl::console::Console;
use anesthesia_rl::feedback::{run_interactive, FeedbackSession};
use anesthesia_rl::rl::{
    evaluate_policy, load_or_train, AnesthesiaEnv, EvalHook, ModelSource, Policy, PpoPolicy,
    TrainReport,
};
use anesthesia_rl::telemetry::init_tracing;

#[derive(Parser)]
#[command(name = "anesthesia-rl")]
#[command(version = "0.1.0")]
#[command(about = "Reinforcement-learning dose recommender for anesthesia", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Random seed for patient sampling and training
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Use small training budgets
    #[arg(long, global = true)]
    quick: bool,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a policy from scratch and save it
    Train {
        /// Training timesteps (defaults to the configured budget)
        #[arg(long)]
        steps: Option<u64>,

        /// Output policy file (defaults to the configured model path)
        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<PathBuf>,
    },

    /// Evaluate a saved policy with deterministic actions
    Evaluate {
        /// Policy file (defaults to the configured model path)
        #[arg(value_name = "MODEL")]
        model: Option<PathBuf>,

        /// Number of evaluation episodes
        #[arg(short = 'n', long, default_value = "10")]
        episodes: usize,
    },

    /// Interactive dose consultation with clinician feedback
    Consult {
        /// JSONL audit log of every consultation
        #[arg(long, value_name = "AUDIT")]
        audit: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = load_config(cli.config.as_ref(), cli.seed, cli.quick)?;

    match cli.command {
        Commands::Train { steps, output } => train_command(cfg, steps, output),
        Commands::Evaluate { model, episodes } => evaluate_command(cfg, model, episodes),
        Commands::Consult { audit } => consult_command(cfg, audit),
    }
}

fn load_config(path: Option<&PathBuf>, seed: Option<u64>, quick: bool) -> Result<AppConfig> {
    let mut cfg = match path {
        Some(path) => AppConfig::from_file(path)?,
        None if quick => AppConfig::default_quick(),
        None => AppConfig::default(),
    };
    if let Some(seed) = seed {
        cfg = cfg.with_seed(seed);
    }
    cfg.validate()
        .map_err(|e| anyhow!("invalid configuration: {}", e))?;
    Ok(cfg)
}

/// Evaluation environment, seeded apart from the training one
fn eval_env(cfg: &AppConfig) -> AnesthesiaEnv {
    let mut env_cfg = cfg.env.clone();
    env_cfg.seed = env_cfg.seed.map(|s| s.wrapping_add(1));
    AnesthesiaEnv::new(env_cfg)
}

fn train_command(cfg: AppConfig, steps: Option<u64>, output: Option<PathBuf>) -> Result<()> {
    let steps = steps.unwrap_or(cfg.initial_train_steps);
    let output = output.unwrap_or_else(|| cfg.model_path.clone());

    let mut env = AnesthesiaEnv::new(cfg.env.clone());
    let mut eval = eval_env(&cfg);
    let hook = if cfg.eval.eval_freq > 0 {
        Some(EvalHook {
            env: &mut eval,
            cfg: &cfg.eval,
        })
    } else {
        None
    };

    let mut policy = PpoPolicy::for_env(&env, cfg.ppo.clone())?;
    let report = policy.learn_with_eval(&mut env, steps, false, hook)?;
    policy
        .save(&output)
        .with_context(|| format!("Failed to save policy to: {}", output.display()))?;

    print_train_report(&report);
    finish_reward_log(&cfg, &env)?;
    println!("✓ Policy saved: {}", output.display());

    Ok(())
}

fn evaluate_command(cfg: AppConfig, model: Option<PathBuf>, episodes: usize) -> Result<()> {
    let model = model.unwrap_or_else(|| cfg.model_path.clone());
    let policy = PpoPolicy::load(&model)
        .with_context(|| format!("Failed to load policy from: {}", model.display()))?;

    let mut env = AnesthesiaEnv::new(cfg.env.clone());
    let report = evaluate_policy(&mut env, &policy, episodes)?;

    println!("Evaluation of {} ({} episodes)", model.display(), report.n_episodes);
    println!(
        "  Return: {:.3} ± {:.3}",
        report.avg_return, report.std_return
    );
    println!("  Episode length: {:.1}", report.avg_episode_length);

    Ok(())
}

fn consult_command(mut cfg: AppConfig, audit: Option<PathBuf>) -> Result<()> {
    if audit.is_some() {
        cfg.feedback.audit_path = audit;
    }

    let mut env = AnesthesiaEnv::new(cfg.env.clone());
    let mut eval = eval_env(&cfg);
    let hook = if cfg.eval.eval_freq > 0 {
        Some(EvalHook {
            env: &mut eval,
            cfg: &cfg.eval,
        })
    } else {
        None
    };

    let (policy, source) = load_or_train(
        &cfg.model_path,
        &mut env,
        &cfg.ppo,
        cfg.initial_train_steps,
        hook,
    )?;
    if let ModelSource::Trained(report) = &source {
        print_train_report(report);
    }

    let mut session = FeedbackSession::new(env, policy, cfg.feedback.clone())?;
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut console = Console::new(stdin.lock(), stdout.lock());

    let consultations = run_interactive(&mut session, &mut console)?;
    let fine_tuned = session.fine_tuned();
    let (env, policy) = session.into_parts();

    if fine_tuned {
        policy.save(&cfg.finetuned_path).with_context(|| {
            format!(
                "Failed to save fine-tuned policy to: {}",
                cfg.finetuned_path.display()
            )
        })?;
        println!("✓ Fine-tuned policy saved: {}", cfg.finetuned_path.display());
    }

    finish_reward_log(&cfg, &env)?;
    println!("Consultations: {}", consultations);

    Ok(())
}

fn print_train_report(report: &TrainReport) {
    println!(
        "Trained {} steps ({} total, {} updates, {} episodes)",
        report.steps, report.total_timesteps, report.n_updates, report.episodes_completed
    );
    if let Some(mean) = report.mean_episode_return {
        println!("  Mean episode return: {:.3}", mean);
    }
    if let Some(best) = report.best_eval_return {
        println!("  Best evaluation return: {:.3}", best);
    }
}

fn finish_reward_log(cfg: &AppConfig, env: &AnesthesiaEnv) -> Result<()> {
    let log = env.reward_log();
    if let Some(summary) = log.summary(cfg.reward_window) {
        println!(
            "Reward log: {} steps, mean {:.3}, min {:.3}, max {:.3}, last {:.3}, recent mean {:.3}",
            summary.count, summary.mean, summary.min, summary.max, summary.last, summary.recent_mean
        );
    }

    if let Some(path) = &cfg.reward_log_path {
        log.export_json(path, cfg.reward_window)
            .with_context(|| format!("Failed to write reward log to: {}", path.display()))?;
        println!("✓ Reward log written: {}", path.display());
    }

    Ok(())
}
