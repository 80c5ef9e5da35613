//! Command surface of the `twod` binary.
//!
//! Hosts can embed the same behavior through:
//! - [`run_cli`] for full parsed CLI execution.
//! - [`run_command`] for a parsed [`Command`] against an open
//!   [`SqliteForecastStore`].

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use serde_json::Value;
use time::Date;
use twod_forecast_core::{
    format_history_prompt, format_iso_date, fuse_rankings, now_utc, parse_iso_date,
    parse_rfc3339_utc, record_outcome, today_utc, BacktestConfig, BacktestReport, DrawEntry,
    DrawRecord, ExpertRegistry, ExternalPrediction, ExternalPredictor, ForecastEngine,
    ForecastRuleset, ForecastStorage, FusedPicks, ImportReport, MarketQuote, MarketReading,
    PredictionRequest, PredictionResult, RecordId, RecordStore, ScoredNumber, TwoDigit,
    UnavailablePredictor, WeightVector,
};
use twod_forecast_store_sqlite::{AdaptationLogEntry, SqliteForecastStore};

const PROMPT_HISTORY_LIMIT: usize = 30;
const EXTERNAL_UNAVAILABLE: &str = "external ranking unavailable";

#[derive(Debug, Parser)]
#[command(name = "twod")]
#[command(about = "Adaptive two-digit draw forecasting")]
pub struct Cli {
    #[arg(long, env = "TWOD_DB", default_value = "./twod_forecast.sqlite3", global = true)]
    db: PathBuf,

    /// Log filter, e.g. `info` or `twod_forecast_core=debug`.
    #[arg(long, env = "TWOD_LOG", global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    #[must_use]
    pub fn log_level(&self) -> Option<&str> {
        self.log_level.as_deref()
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Record {
        #[command(subcommand)]
        command: Box<RecordCommand>,
    },
    Import(ImportArgs),
    Predict(PredictArgs),
    Scenario(ScenarioArgs),
    Weights {
        #[command(subcommand)]
        command: Box<WeightsCommand>,
    },
    Backtest(BacktestArgs),
    Credential {
        #[command(subcommand)]
        command: Box<CredentialCommand>,
    },
    Ruleset {
        #[command(subcommand)]
        command: Box<RulesetCommand>,
    },
}

#[derive(Debug, Subcommand)]
pub enum RecordCommand {
    Add(RecordAddArgs),
    Delete(RecordDeleteArgs),
    Clear(RecordClearArgs),
    List(RecordListArgs),
    Latest(JsonArgs),
}

#[derive(Debug, Args)]
pub struct RecordAddArgs {
    #[arg(long)]
    date: String,
    #[arg(long)]
    am: String,
    #[arg(long)]
    pm: String,
    #[arg(long)]
    market_index: Option<String>,
    #[arg(long)]
    market_value: Option<String>,
    /// Store the record without adapting the expert weights.
    #[arg(long)]
    no_adapt: bool,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct RecordDeleteArgs {
    #[arg(long)]
    id: String,
}

#[derive(Debug, Args)]
pub struct RecordClearArgs {
    /// Required confirmation; every stored record is removed.
    #[arg(long)]
    yes: bool,
}

#[derive(Debug, Args)]
pub struct RecordListArgs {
    #[arg(long)]
    limit: Option<usize>,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct JsonArgs {
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// File with pasted report text; `-` reads standard input.
    #[arg(long)]
    file: PathBuf,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct PredictArgs {
    /// Target date; defaults to the day after the latest record.
    #[arg(long)]
    date: Option<String>,
    #[arg(long)]
    seed: Option<u64>,
    /// Also score with the seasonal and market experts.
    #[arg(long)]
    extended: bool,
    #[arg(long, requires = "market_value")]
    market_index: Option<String>,
    #[arg(long, requires = "market_index")]
    market_value: Option<String>,
    /// RFC 3339 time the market reading was observed; defaults to now.
    #[arg(long)]
    market_observed_at: Option<String>,
    /// Raw JSON answer of an external model to fuse with the local ranking.
    #[arg(long)]
    external_json: Option<PathBuf>,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct ScenarioArgs {
    #[arg(long)]
    am: String,
    #[arg(long)]
    pm: Option<String>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Subcommand)]
pub enum WeightsCommand {
    Show(JsonArgs),
    Reset,
    History(WeightsHistoryArgs),
}

#[derive(Debug, Args)]
pub struct WeightsHistoryArgs {
    #[arg(long, default_value_t = 20)]
    limit: usize,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct BacktestArgs {
    #[arg(long, default_value_t = 30)]
    days: usize,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Feed each evaluated outcome back through the weight adapter.
    #[arg(long)]
    adapt: bool,
    #[arg(long)]
    extended: bool,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Subcommand)]
pub enum CredentialCommand {
    Set(CredentialSetArgs),
    Show,
}

#[derive(Debug, Args)]
pub struct CredentialSetArgs {
    #[arg(long)]
    value: String,
}

#[derive(Debug, Subcommand)]
pub enum RulesetCommand {
    Show(RulesetShowArgs),
    Load(RulesetLoadArgs),
}

#[derive(Debug, Args)]
pub struct RulesetShowArgs {
    /// Defaults to the active (highest) version.
    #[arg(long)]
    version: Option<u32>,
}

#[derive(Debug, Args)]
pub struct RulesetLoadArgs {
    #[arg(long)]
    file: PathBuf,
}

/// Installs the stderr log subscriber. `level` wins over `RUST_LOG`; with
/// neither set only warnings are shown.
pub fn init_tracing(level: Option<&str>) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = match level {
        Some(level) => EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn")),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Executes the parsed top-level CLI command graph.
///
/// # Errors
/// Returns an error when opening or migrating the database fails, or when the
/// command itself fails.
pub fn run_cli(cli: Cli) -> Result<()> {
    let store = open_store(&cli.db)?;
    run_command(cli.command, store)
}

/// Opens and migrates the database at `db_path`.
///
/// # Errors
/// Returns an error when the database cannot be opened or migrated.
pub fn open_store(db_path: &Path) -> Result<SqliteForecastStore> {
    let store = SqliteForecastStore::open(db_path)?;
    store.migrate()?;
    Ok(store)
}

/// Executes a parsed command against an open store.
///
/// # Errors
/// Returns an error when input validation, persistence or the command fails.
pub fn run_command(command: Command, store: SqliteForecastStore) -> Result<()> {
    let mut records = RecordStore::open(store)?;
    match command {
        Command::Record { command } => run_record(*command, &mut records),
        Command::Import(args) => {
            let text = read_input(&args.file)?;
            let report = records.bulk_import(&text)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_import_report(&report);
            }
            Ok(())
        }
        Command::Predict(args) => run_predict(&args, &records),
        Command::Scenario(args) => {
            let engine = build_engine(records.storage(), false)?;
            let weights = stored_weights(records.storage())?;
            let am = parse_two_digit("am", &args.am)?;
            let pm = args
                .pm
                .as_deref()
                .map(|raw| parse_two_digit("pm", raw))
                .transpose()?;
            let mut rng = seeded_rng(args.seed);
            let result =
                engine.simulate_scenario_with_rng(records.records(), &weights, am, pm, &mut rng);
            if args.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_prediction(&result);
            }
            Ok(())
        }
        Command::Weights { command } => run_weights(*command, &mut records),
        Command::Backtest(args) => {
            let engine = build_engine(records.storage(), args.extended)?;
            let weights = stored_weights(records.storage())?;
            let report = engine.run_backtest(
                records.records(),
                &weights,
                &BacktestConfig {
                    days: args.days,
                    seed: args.seed,
                    adapt_weights: args.adapt,
                },
            )?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_backtest_report(&report);
            }
            Ok(())
        }
        Command::Credential { command } => match *command {
            CredentialCommand::Set(args) => {
                let value = args.value.trim();
                if value.is_empty() {
                    return Err(anyhow!("credential value must not be empty"));
                }
                records.storage_mut().save_credential(value)?;
                println!("credential=stored");
                Ok(())
            }
            CredentialCommand::Show => {
                match records.storage().load_credential()? {
                    Some(value) => println!("credential={}", mask_secret(&value)),
                    None => println!("credential=none"),
                }
                Ok(())
            }
        },
        Command::Ruleset { command } => run_ruleset(*command, records.storage()),
    }
}

fn run_record(command: RecordCommand, records: &mut RecordStore<SqliteForecastStore>) -> Result<()> {
    match command {
        RecordCommand::Add(args) => {
            let entry = DrawEntry::new(
                parse_date(&args.date)?,
                parse_two_digit("am", &args.am)?,
                parse_two_digit("pm", &args.pm)?,
            )
            .with_market(args.market_index, args.market_value);

            if args.no_adapt {
                let id = records.add_or_replace(entry)?;
                let record = records
                    .get(id)
                    .ok_or_else(|| anyhow!("record {id} vanished after commit"))?;
                if args.json {
                    println!("{}", serde_json::to_string_pretty(record)?);
                } else {
                    print_records(std::slice::from_ref(record));
                }
                return Ok(());
            }

            let engine = build_engine(records.storage(), false)?;
            let weights = stored_weights(records.storage())?;
            let date = entry.date;
            let outcome = record_outcome(records, &engine, entry, &weights)?;

            let mut log_entries = Vec::with_capacity(outcome.updates.len());
            for (session, update) in &outcome.updates {
                log_entries.push(records.storage().append_adaptation(date, *session, update)?);
            }

            let record = records
                .get(outcome.record_id)
                .ok_or_else(|| anyhow!("record {} vanished after commit", outcome.record_id))?;
            if args.json {
                let payload = RecordAddJsonPayload {
                    record,
                    adaptations: &log_entries,
                    weights: &outcome.weights,
                };
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                print_records(std::slice::from_ref(record));
                print_adaptations(&log_entries);
            }
            Ok(())
        }
        RecordCommand::Delete(args) => {
            let id = RecordId::parse(&args.id)?;
            let removed = records.delete(id)?;
            println!("deleted={}", if removed { "yes" } else { "no" });
            Ok(())
        }
        RecordCommand::Clear(args) => {
            if !args.yes {
                return Err(anyhow!(
                    "refusing to clear {} records without --yes",
                    records.len()
                ));
            }
            records.clear()?;
            println!("cleared=yes");
            Ok(())
        }
        RecordCommand::List(args) => {
            let limit = args.limit.unwrap_or(usize::MAX);
            let listed = &records.records()[..records.len().min(limit)];
            if args.json {
                println!("{}", serde_json::to_string_pretty(listed)?);
            } else {
                print_records(listed);
            }
            Ok(())
        }
        RecordCommand::Latest(args) => {
            let latest = records.latest();
            if args.json {
                println!("{}", serde_json::to_string_pretty(&latest)?);
            } else {
                match latest {
                    Some(record) => print_records(std::slice::from_ref(record)),
                    None => println!("records=none"),
                }
            }
            Ok(())
        }
    }
}

fn run_predict(args: &PredictArgs, records: &RecordStore<SqliteForecastStore>) -> Result<()> {
    let engine = build_engine(records.storage(), args.extended)?;
    let weights = stored_weights(records.storage())?;

    let target_date = match args.date.as_deref() {
        Some(raw) => parse_date(raw)?,
        None => default_target_date(records.latest()),
    };
    let history = records.history_before(target_date);

    let mut request = PredictionRequest::for_date(target_date);
    if let (Some(index), Some(value)) = (&args.market_index, &args.market_value) {
        let observed_at = match args.market_observed_at.as_deref() {
            Some(raw) => parse_rfc3339_utc(raw)?,
            None => now_utc(),
        };
        request = request.with_market_quote(MarketQuote {
            reading: MarketReading::new(index.clone(), value.clone()),
            observed_at,
        });
    }

    let mut rng = seeded_rng(args.seed);
    let mut prediction = engine.predict_with_rng(history, &weights, &request, &mut rng);

    let external = match &args.external_json {
        Some(path) => {
            let predictor = AnswerFilePredictor::load(path)?;
            predictor.predict(history)
        }
        None => UnavailablePredictor.predict(history),
    };
    if external.is_none() {
        prediction.mark_degraded(EXTERNAL_UNAVAILABLE);
    }
    let fusion = fuse_rankings(&prediction, external.as_ref());

    if args.json {
        let payload = PredictJsonPayload {
            target_date: format_iso_date(target_date),
            prediction: &prediction,
            fusion: &fusion,
            external_prompt: format_history_prompt(history, PROMPT_HISTORY_LIMIT),
        };
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("target_date={}", format_iso_date(target_date));
        print_prediction(&prediction);
        print_fusion(&fusion);
    }
    Ok(())
}

fn run_weights(command: WeightsCommand, records: &mut RecordStore<SqliteForecastStore>) -> Result<()> {
    match command {
        WeightsCommand::Show(args) => {
            let weights = stored_weights(records.storage())?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&weights)?);
            } else {
                print_weights(&weights);
            }
            Ok(())
        }
        WeightsCommand::Reset => {
            let weights = WeightVector::v1_default();
            records.storage_mut().save_weights(&weights)?;
            tracing::info!("expert weights reset to defaults");
            print_weights(&weights);
            Ok(())
        }
        WeightsCommand::History(args) => {
            let entries = records.storage().list_adaptations(args.limit)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                print_adaptations(&entries);
            }
            Ok(())
        }
    }
}

fn run_ruleset(command: RulesetCommand, store: &SqliteForecastStore) -> Result<()> {
    match command {
        RulesetCommand::Show(args) => {
            let ruleset = match args.version {
                Some(version) => store
                    .get_rulesets()?
                    .remove(&version)
                    .ok_or_else(|| anyhow!("ruleset version {version} not found"))?,
                None => store.active_ruleset()?,
            };
            println!("{}", serde_json::to_string_pretty(&ruleset)?);
            Ok(())
        }
        RulesetCommand::Load(args) => {
            let raw = std::fs::read_to_string(&args.file)
                .with_context(|| format!("failed to read ruleset file {}", args.file.display()))?;
            let value: Value = serde_json::from_str(&raw)
                .with_context(|| format!("invalid JSON in {}", args.file.display()))?;
            let ruleset = ForecastRuleset::from_json(&value)?;
            store.upsert_ruleset(&ruleset)?;
            println!("ruleset_version={} stored=yes", ruleset.ruleset_version);
            Ok(())
        }
    }
}

/// External answer read from a file the host obtained from the model.
struct AnswerFilePredictor {
    answer: Option<ExternalPrediction>,
}

impl AnswerFilePredictor {
    fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read external answer {}", path.display()))?;
        let answer = serde_json::from_str::<Value>(&raw)
            .map_err(|err| anyhow!("external answer is not JSON: {err}"))
            .and_then(|value| ExternalPrediction::from_json(&value).map_err(anyhow::Error::from));
        match answer {
            Ok(answer) => Ok(Self {
                answer: Some(answer),
            }),
            Err(err) => {
                tracing::warn!(error = %err, "discarding invalid external answer");
                Ok(Self { answer: None })
            }
        }
    }
}

impl ExternalPredictor for AnswerFilePredictor {
    fn predict(&self, _history: &[DrawRecord]) -> Option<ExternalPrediction> {
        self.answer.clone()
    }
}

#[derive(Serialize)]
struct RecordAddJsonPayload<'a> {
    record: &'a DrawRecord,
    adaptations: &'a [AdaptationLogEntry],
    weights: &'a WeightVector,
}

#[derive(Serialize)]
struct PredictJsonPayload<'a> {
    target_date: String,
    prediction: &'a PredictionResult,
    fusion: &'a FusedPicks,
    external_prompt: String,
}

fn build_engine(store: &SqliteForecastStore, extended: bool) -> Result<ForecastEngine> {
    let ruleset = store.active_ruleset()?;
    let registry = if extended {
        ExpertRegistry::extended()
    } else {
        ExpertRegistry::standard()
    };
    Ok(ForecastEngine::new(ruleset, registry)?)
}

fn stored_weights(store: &SqliteForecastStore) -> Result<WeightVector> {
    Ok(store.load_weights()?.unwrap_or_default())
}

fn default_target_date(latest: Option<&DrawRecord>) -> Date {
    latest
        .and_then(|record| record.date.next_day())
        .unwrap_or_else(today_utc)
}

fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_rng(&mut rand::rng()),
    }
}

fn parse_date(raw: &str) -> Result<Date> {
    parse_iso_date(raw).map_err(|err| anyhow!("{err}"))
}

fn parse_two_digit(field: &str, raw: &str) -> Result<TwoDigit> {
    TwoDigit::parse(raw).map_err(|err| anyhow!("invalid --{field}: {err}"))
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("failed to read standard input")?;
        return Ok(text);
    }
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn mask_secret(secret: &str) -> String {
    let visible: String = secret
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if secret.chars().count() <= 4 {
        return "*".repeat(secret.chars().count());
    }
    format!("****{visible}")
}

fn print_records(records: &[DrawRecord]) {
    println!(
        "{:<26} {:<10} {:<9} {:<3} {:<3} market",
        "id", "date", "day", "am", "pm"
    );
    println!("{}", "-".repeat(72));
    for record in records {
        let market = match (&record.market_index, &record.market_value) {
            (Some(index), Some(value)) => format!("{index} / {value}"),
            _ => "-".to_string(),
        };
        println!(
            "{:<26} {:<10} {:<9} {:<3} {:<3} {}",
            record.id,
            format_iso_date(record.date),
            record.day_of_week(),
            record.am,
            record.pm,
            market
        );
    }
}

fn print_import_report(report: &ImportReport) {
    println!(
        "imported={} errors={}",
        report.imported,
        report.error_count()
    );
    for issue in &report.errors {
        println!("{issue}");
    }
}

fn print_scored(label: &str, picks: &[ScoredNumber]) {
    println!("{label}:");
    for scored in picks {
        println!(
            "  {} score={:<8.3} confidence={:<2} tags={}",
            scored.number,
            scored.score,
            scored.confidence,
            scored.tags.join(",")
        );
    }
}

fn print_prediction(result: &PredictionResult) {
    let digit = |value: Option<u8>| value.map_or_else(|| "-".to_string(), |d| d.to_string());
    println!(
        "analyzed={} simulations={} strongest_head={} strongest_tail={} double_risk={}",
        result.meta.analyzed_count,
        result.meta.simulations_run,
        digit(result.strongest_head),
        digit(result.strongest_tail),
        if result.is_double_risk { "yes" } else { "no" }
    );
    print_scored("high", &result.high_confidence);
    print_scored("medium", &result.medium_confidence);
    if !result.excluded.is_empty() {
        let excluded = result
            .excluded
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        println!("excluded={excluded}");
    }
    for insight in &result.insights {
        println!("insight: {insight}");
    }
}

fn print_fusion(fusion: &FusedPicks) {
    let picks = fusion
        .picks
        .iter()
        .map(|pick| pick.number.to_string())
        .collect::<Vec<_>>()
        .join(",");
    println!(
        "fused={picks} external={}",
        if fusion.external_available { "yes" } else { "no" }
    );
    println!("fusion: {}", fusion.summary);
}

fn print_weights(weights: &WeightVector) {
    println!("{:<16} weight", "expert");
    println!("{}", "-".repeat(26));
    for (kind, value) in weights.iter() {
        println!("{:<16} {value:.4}", kind.as_str());
    }
}

fn print_adaptations(entries: &[AdaptationLogEntry]) {
    println!(
        "{:<6} {:<10} {:<8} {:<7} {:<7} predicted_by",
        "seq", "date", "session", "outcome", "changed"
    );
    println!("{}", "-".repeat(72));
    for entry in entries {
        let predicted_by = entry
            .predicted_by
            .iter()
            .map(|kind| kind.as_str())
            .collect::<Vec<_>>()
            .join(",");
        println!(
            "{:<6} {:<10} {:<8} {:<7} {:<7} {}",
            entry.adaptation_seq,
            entry.draw_date,
            entry.session.as_str(),
            entry.outcome,
            if entry.changed { "yes" } else { "no" },
            if predicted_by.is_empty() { "-" } else { predicted_by.as_str() }
        );
    }
}

fn print_backtest_report(report: &BacktestReport) {
    println!(
        "contract={} days={} evaluated={} skipped={} hits={} accuracy={:.1}%",
        report.contract_version,
        report.days,
        report.evaluated,
        report.skipped,
        report.hits,
        report.accuracy_pct
    );
    println!(
        "predict_p50_ms={:.3} predict_p95_ms={:.3}",
        report.predict_p50_ms, report.predict_p95_ms
    );
    println!("{:<8} {:<6} {:<6} accuracy", "month", "hits", "total");
    println!("{}", "-".repeat(32));
    for month in &report.months {
        println!(
            "{:<8} {:<6} {:<6} {:.1}%",
            month.month, month.hits, month.total, month.accuracy_pct
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn must<T>(result: Result<T>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("test failure: {err}"),
        }
    }

    fn parse(args: &[&str]) -> Cli {
        match Cli::try_parse_from(args) {
            Ok(cli) => cli,
            Err(err) => panic!("failed to parse {args:?}: {err}"),
        }
    }

    #[test]
    fn record_add_parses_market_fields() {
        let cli = parse(&[
            "twod",
            "--db",
            "x.sqlite3",
            "record",
            "add",
            "--date",
            "2026-01-23",
            "--am",
            "43",
            "--pm",
            "91",
            "--market-index",
            "1,314.39",
            "--market-value",
            "50,901.86",
            "--no-adapt",
        ]);
        match cli.command {
            Command::Record { command } => match *command {
                RecordCommand::Add(args) => {
                    assert_eq!(args.market_index.as_deref(), Some("1,314.39"));
                    assert!(args.no_adapt);
                }
                other => panic!("unexpected command: {other:?}"),
            },
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn predict_market_fields_require_each_other() {
        assert!(Cli::try_parse_from(["twod", "predict", "--market-index", "1.00"]).is_err());
    }

    #[test]
    fn default_target_is_day_after_latest() {
        let record = DrawRecord::new(
            must(parse_date("2026-01-31")),
            must(parse_two_digit("am", "43")),
            must(parse_two_digit("pm", "91")),
        );
        assert_eq!(
            default_target_date(Some(&record)),
            must(parse_date("2026-02-01"))
        );
    }

    #[test]
    fn two_digit_errors_name_the_flag() {
        let err = match parse_two_digit("am", "7") {
            Ok(_) => panic!("expected error"),
            Err(err) => err,
        };
        assert!(err.to_string().contains("--am"));
    }

    #[test]
    fn secrets_are_masked() {
        assert_eq!(mask_secret("abcdefgh"), "****efgh");
        assert_eq!(mask_secret("abc"), "***");
    }

    #[test]
    fn commands_run_against_in_memory_store() {
        let store = must(open_store(Path::new(":memory:")));
        let cli = parse(&["twod", "weights", "show", "--json"]);
        must(run_command(cli.command, store));
    }
}
