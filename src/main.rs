use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info};
use tokio::io::{AsyncBufReadExt, BufReader};

use neurocheck_lib::analysis::{InferenceClient, ScanAnalyzer, ScanType, ScanUpload};
use neurocheck_lib::assessment::{
    default_questions, load_question_bank, AssessmentReport, FlowEvent, QuestionFlowController,
    StimulusPhase,
};
use neurocheck_lib::config::AppConfig;
use neurocheck_lib::session::SessionContext;
use neurocheck_lib::speech::SpeechCaptureAdapter;

#[derive(Parser, Debug)]
#[command(name = "neurocheck", version, about = "Cognitive screening and brain scan analysis")]
struct Cli {
    /// Configuration file (defaults to ./neurocheck.{toml,yaml,json} when present)
    #[arg(short, long, global = true, env = "NEUROCHECK_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the cognitive assessment in the terminal
    Assess {
        /// Question bank JSON file
        #[arg(short, long)]
        questions: Option<PathBuf>,
        #[arg(short, long, default_value = "local-user")]
        user: String,
        /// Print the final report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Analyze a brain scan image
    Analyze {
        #[arg(short, long, value_parser = parse_scan_type)]
        scan_type: ScanType,
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

fn parse_scan_type(s: &str) -> std::result::Result<ScanType, String> {
    s.parse()
}

#[tokio::main]
async fn main() {
    neurocheck_lib::init_logging();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("❌ {:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::load(cli.config.as_deref())?;
    neurocheck_lib::log_configuration_status(&config);

    match cli.command {
        Command::Assess { questions, user, json } => {
            let bank = questions.or_else(|| config.assessment.question_bank.clone());
            let questions = match bank {
                Some(path) => load_question_bank(&path)?,
                None => default_questions(),
            };
            let report = run_assessment(&config, questions, &user).await?;
            if let Some(report) = report {
                print_report(&report, json)?;
            }
            Ok(())
        }
        Command::Analyze { scan_type, file, json } => analyze_scan(&config, scan_type, &file, json).await,
    }
}

async fn analyze_scan(config: &AppConfig, scan_type: ScanType, file: &Path, json: bool) -> Result<()> {
    let upload = ScanUpload::from_path(file, scan_type)?;

    let analyzer = ScanAnalyzer::new(InferenceClient::new(config.inference.clone())?);
    println!("Analyzing {} ({})...", upload.file_name, scan_type.description());
    let result = analyzer.analyze(&upload).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    let tier = result.tier();
    println!("\n{} - {} ({:.0}% confidence)", result.file_name, tier.label, result.confidence);
    println!("{}", tier.guidance);
    println!("\nFindings:");
    for finding in &result.findings {
        println!("  • {}", finding);
    }
    println!("\nRecommendations:");
    for recommendation in &result.recommendations {
        println!("  • {}", recommendation);
    }
    if result.source == neurocheck_lib::analysis::VerdictSource::Fallback {
        println!("\n⚠️  The model response could not be read; showing the default review verdict.");
    }
    Ok(())
}

const HELP: &str = "Commands: <number> choose option | <text> answer | :n next | :p previous | :g <n> go to question | :s speak | :f finish | :q quit";

async fn run_assessment(
    config: &AppConfig,
    questions: Vec<neurocheck_lib::Question>,
    user: &str,
) -> Result<Option<AssessmentReport>> {
    // Terminals have no speech recognizer; speech questions take typed answers
    let speech = SpeechCaptureAdapter::unsupported(config.speech.clone());
    let mut controller = QuestionFlowController::new(
        SessionContext::new(user, true),
        questions,
        config.assessment.clone(),
        speech,
    )?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{}", HELP);
    render(&controller);

    loop {
        let pending = controller.has_pending_events();
        tokio::select! {
            Some(event) = controller.next_event(), if pending => {
                on_event(&controller, &event);
            }
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read input")? else {
                    info!("Input closed, leaving assessment");
                    controller.teardown();
                    return Ok(None);
                };
                match handle_command(&mut controller, line.trim()) {
                    Step::Continue => {}
                    Step::Quit => {
                        controller.teardown();
                        return Ok(None);
                    }
                    Step::Finished(report) => return Ok(Some(*report)),
                }
            }
        }
    }
}

enum Step {
    Continue,
    Quit,
    Finished(Box<AssessmentReport>),
}

fn handle_command(controller: &mut QuestionFlowController, input: &str) -> Step {
    let outcome = match input {
        "" => return Step::Continue,
        ":q" => return Step::Quit,
        ":h" => {
            println!("{}", HELP);
            return Step::Continue;
        }
        ":n" => controller.next().map(|_| render(controller)),
        ":p" => controller.previous().map(|_| render(controller)),
        ":s" => controller.start_speech().map(|_| println!("Listening...")),
        ":f" => match controller.finish() {
            Ok(report) => return Step::Finished(Box::new(report)),
            Err(e) => Err(e),
        },
        cmd if cmd.starts_with(":g") => match cmd[2..].trim().parse::<usize>() {
            Ok(n) if n >= 1 => controller.jump_to(n - 1).map(|_| render(controller)),
            _ => {
                println!("Usage: :g <question number>");
                return Step::Continue;
            }
        },
        text => {
            let question = controller.current_question();
            if question.has_options() {
                match text.parse::<usize>().ok().and_then(|n| question.options().get(n.wrapping_sub(1))) {
                    Some(option) => {
                        let option = option.clone();
                        controller.select_option(&option).map(|_| println!("Selected: {}", option))
                    }
                    None => {
                        println!("Choose an option by number (1-{})", question.options().len());
                        return Step::Continue;
                    }
                }
            } else {
                controller.submit_response(text).map(|_| println!("Answer recorded."))
            }
        }
    };

    if let Err(e) = outcome {
        println!("⚠️  {}", e);
    }
    if let Some(notice) = controller.speech_notice() {
        println!("ℹ️  {} - type your answer instead.", notice);
    }
    Step::Continue
}

fn on_event(controller: &QuestionFlowController, event: &FlowEvent) {
    match event {
        FlowEvent::StimulusHidden { .. } => {
            println!("(The words are now hidden.)");
            render(controller);
        }
        FlowEvent::AutoAdvanced { .. } => render(controller),
        FlowEvent::InterimTranscript { text, .. } => println!("  … {}", text),
        FlowEvent::TranscriptCommitted { text, .. } => println!("Heard: \"{}\"", text),
        FlowEvent::CaptureFailed { error, .. } => println!("⚠️  {}", error),
    }
}

fn render(controller: &QuestionFlowController) {
    let progress = controller.progress();
    let question = controller.current_question();
    println!(
        "\n[{}/{} · {:.0}%] {} question",
        progress.position,
        progress.total,
        progress.percent,
        question.category.label()
    );

    if controller.phase() == StimulusPhase::Presenting {
        if let Some(items) = controller.visible_stimulus() {
            println!("Remember these: {}", items.join("  "));
        }
        return;
    }

    println!("{}", question.prompt);
    for (i, option) in question.options().iter().enumerate() {
        println!("  {}. {}", i + 1, option);
    }
    if let Some(answer) = controller.answers().get(question.id) {
        println!("  (current answer: {})", answer);
    }
}

fn print_report(report: &AssessmentReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("\n=== Assessment complete ===");
    for category in &report.score.categories {
        println!(
            "{:<16} {:>3}%  ({:.1}/{} correct)",
            category.category.label(),
            category.score,
            category.earned,
            category.scored
        );
    }
    println!("\nRisk score: {:.1} - {}", report.score.risk_score, report.tier.label);
    println!("{}", report.tier.guidance);
    Ok(())
}
