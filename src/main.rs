use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::*;
use rust_decimal::Decimal;
use std::path::PathBuf;
use tabled::{settings::Style, Table, Tabled};

use fatiguers::analytics::{AnalysisPeriod, FatigueTrend, SubjectivePoint};
use fatiguers::config::AppConfig;
use fatiguers::database::SqliteStore;
use fatiguers::engine::{AnalysisCorrection, AnalysisRequest, FatigueEngine};
use fatiguers::error::FatigueError;
use fatiguers::export::{self, ExportData, ExportFormat};
use fatiguers::logging::{self, LogLevel};
use fatiguers::models::{
    AlertId, AnalysisId, ClientId, ClientRef, EntryId, FatigueAlert, FatigueAnalysis,
    NewWorkloadEntry, Page, RiskLevel, SubjectiveInputs, TrainerId, UserId, WorkloadEntry,
    WorkloadUpdate,
};
use fatiguers::rollup::WorkloadRollup;
use fatiguers::scope::AccessScope;

/// Fatiguers - Workload & Fatigue Analytics CLI
///
/// Records per-session training load, derives acute:chronic workload ratios,
/// monotony and strain, scores fatigue risk and raises alerts for trainers.
#[derive(Parser)]
#[command(name = "fatiguers")]
#[command(version)]
#[command(about = "Workload & Fatigue Analytics CLI", long_about = None)]
struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Overrides the database path from the config
    #[arg(long, value_name = "FILE", global = true)]
    db: Option<PathBuf>,

    /// Increase verbosity of output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(flatten)]
    scope: ScopeArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ScopeArgs {
    /// Act with access to every client
    #[arg(long, global = true, conflicts_with = "trainer")]
    admin: bool,

    /// Act as this trainer
    #[arg(long, global = true, value_name = "ID")]
    trainer: Option<u64>,

    /// Clients the trainer may access
    #[arg(long, global = true, value_delimiter = ',', value_name = "IDS")]
    clients: Vec<u64>,

    /// Identity recorded on reads, resolutions and corrections (defaults to the trainer id)
    #[arg(long, global = true, value_name = "ID")]
    user: Option<u64>,
}

impl ScopeArgs {
    fn scope(&self) -> Result<AccessScope> {
        match (self.admin, self.trainer) {
            (true, _) => Ok(AccessScope::Admin),
            (false, Some(trainer)) => Ok(AccessScope::trainer(
                TrainerId(trainer),
                self.clients.iter().copied().map(ClientId),
            )),
            (false, None) => bail!("specify --admin or --trainer <ID> --clients <IDS>"),
        }
    }

    fn user(&self) -> Result<UserId> {
        self.user
            .or(self.trainer)
            .map(UserId)
            .context("specify --user <ID> to act as admin")
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Manage client references
    Client {
        #[command(subcommand)]
        action: ClientAction,
    },

    /// Record a workload observation
    Record {
        #[arg(long)]
        client: u64,

        /// Volume load for the session
        #[arg(long)]
        load: Decimal,

        /// Session RPE-style subjective load (0-10)
        #[arg(long)]
        rpe: Option<Decimal>,

        /// Observation time (RFC 3339, default now)
        #[arg(long)]
        at: Option<DateTime<Utc>>,

        #[arg(long)]
        session: Option<u64>,

        #[arg(long)]
        notes: Option<String>,
    },

    /// Update a workload entry that is not locked yet
    UpdateEntry {
        #[arg(long)]
        id: u64,

        #[arg(long)]
        load: Option<Decimal>,

        #[arg(long)]
        rpe: Option<Decimal>,

        #[arg(long)]
        at: Option<DateTime<Utc>>,

        #[arg(long)]
        notes: Option<String>,
    },

    /// Delete a workload entry
    DeleteEntry {
        #[arg(long)]
        id: u64,
    },

    /// Show a client's workload history
    History {
        #[arg(long)]
        client: u64,

        #[arg(long)]
        from: Option<DateTime<Utc>>,

        #[arg(long)]
        to: Option<DateTime<Utc>>,
    },

    /// Show daily workload rollups
    Rollups {
        #[arg(long)]
        client: u64,

        #[arg(long)]
        from: NaiveDate,

        #[arg(long)]
        to: NaiveDate,
    },

    /// Run a fatigue analysis
    Analyze {
        #[arg(long)]
        client: u64,

        /// Analysis date (default today)
        #[arg(long)]
        as_of: Option<NaiveDate>,

        #[arg(long)]
        session: Option<u64>,

        #[command(flatten)]
        subjective: SubjectiveArgs,
    },

    /// Override the risk or score of a stored analysis
    Correct {
        #[arg(long)]
        id: u64,

        #[arg(long)]
        risk: Option<RiskLevel>,

        #[arg(long)]
        score: Option<Decimal>,

        #[arg(long)]
        notes: Option<String>,
    },

    /// List stored analyses
    Analyses {
        #[arg(long)]
        client: Option<u64>,

        #[command(flatten)]
        page: PageArgs,
    },

    /// Show one analysis in full
    ShowAnalysis {
        #[arg(long)]
        id: u64,
    },

    /// Fatigue trend over a period
    Trend {
        #[arg(long)]
        client: u64,

        /// Period length in days (7-365)
        #[arg(long, default_value_t = AnalysisPeriod::DEFAULT_DAYS)]
        days: u32,

        /// Last day of the period (default today)
        #[arg(long)]
        end: Option<NaiveDate>,
    },

    /// List fatigue alerts
    Alerts {
        #[command(subcommand)]
        view: AlertView,
    },

    /// Mark an alert as read
    Read {
        #[arg(long)]
        id: u64,
    },

    /// Resolve an alert
    Resolve {
        #[arg(long)]
        id: u64,

        #[arg(long)]
        notes: Option<String>,
    },

    /// Re-run the analysis for every client in scope
    Recompute {
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },

    /// Export analyses, alerts, workload or a trend
    Export {
        #[arg(long, value_enum)]
        what: ExportWhat,

        #[arg(long)]
        client: u64,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Export format (csv, json)
        #[arg(short = 'f', long, default_value = "csv")]
        format: ExportFormat,

        /// Period length in days for workload and trend exports
        #[arg(long, default_value_t = AnalysisPeriod::DEFAULT_DAYS)]
        days: u32,
    },

    /// Configure application settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ClientAction {
    /// Register or update a client
    Add {
        #[arg(long)]
        id: u64,

        /// Owning trainer
        #[arg(long = "owner")]
        owner: u64,

        #[arg(long)]
        name: Option<String>,
    },
    /// List clients in scope
    List,
}

#[derive(Subcommand)]
enum AlertView {
    /// Unread alerts across the scope
    Unread {
        #[command(flatten)]
        page: PageArgs,
    },
    /// Open alerts of one client
    Open {
        #[arg(long)]
        client: u64,
    },
    /// Every alert of one client
    List {
        #[arg(long)]
        client: u64,

        #[command(flatten)]
        page: PageArgs,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    Show,
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportWhat {
    Analyses,
    Alerts,
    Workload,
    Trend,
}

#[derive(Args)]
struct PageArgs {
    #[arg(long, default_value_t = 0)]
    skip: usize,

    #[arg(long, default_value_t = 100)]
    limit: usize,
}

impl PageArgs {
    fn page(&self) -> Result<Page> {
        Ok(Page::new(self.skip, self.limit)?)
    }
}

#[derive(Args)]
struct SubjectiveArgs {
    #[arg(long)]
    rpe: Option<Decimal>,
    #[arg(long)]
    soreness: Option<Decimal>,
    #[arg(long)]
    pre_fatigue: Option<Decimal>,
    #[arg(long)]
    post_fatigue: Option<Decimal>,
    #[arg(long)]
    pre_energy: Option<Decimal>,
    #[arg(long)]
    post_energy: Option<Decimal>,
    #[arg(long)]
    sleep: Option<Decimal>,
    #[arg(long)]
    stress: Option<Decimal>,
}

impl SubjectiveArgs {
    fn inputs(&self) -> Option<SubjectiveInputs> {
        let inputs = SubjectiveInputs {
            session_rpe: self.rpe,
            muscle_soreness: self.soreness,
            pre_fatigue_level: self.pre_fatigue,
            post_fatigue_level: self.post_fatigue,
            pre_energy_level: self.pre_energy,
            post_energy_level: self.post_energy,
            sleep_quality: self.sleep,
            stress_level: self.stress,
        };
        (!inputs.is_empty()).then_some(inputs)
    }
}

#[derive(Tabled)]
struct EntryRow {
    id: u64,
    timestamp: String,
    load: Decimal,
    rpe: String,
    notes: String,
}

impl From<&WorkloadEntry> for EntryRow {
    fn from(entry: &WorkloadEntry) -> Self {
        EntryRow {
            id: entry.id.0,
            timestamp: entry.timestamp.format("%Y-%m-%d %H:%M").to_string(),
            load: entry.volume_load,
            rpe: opt(entry.subjective_load),
            notes: entry.notes.clone().unwrap_or_default(),
        }
    }
}

#[derive(Tabled)]
struct RollupRow {
    date: NaiveDate,
    volume: Decimal,
    sessions: u16,
    acute: Decimal,
    chronic: Decimal,
    acwr: String,
}

impl From<&WorkloadRollup> for RollupRow {
    fn from(rollup: &WorkloadRollup) -> Self {
        RollupRow {
            date: rollup.date,
            volume: rollup.total_volume,
            sessions: rollup.entry_count,
            acute: rollup.acute_load.round_dp(1),
            chronic: rollup.chronic_load.round_dp(1),
            acwr: opt(rollup.acwr),
        }
    }
}

#[derive(Tabled)]
struct AnalysisRow {
    id: u64,
    client: u64,
    date: NaiveDate,
    acwr: String,
    zone: String,
    monotony: String,
    score: String,
    risk: String,
}

impl From<&FatigueAnalysis> for AnalysisRow {
    fn from(analysis: &FatigueAnalysis) -> Self {
        let a = &analysis.assessment;
        AnalysisRow {
            id: analysis.id.0,
            client: analysis.client_id.0,
            date: a.analysis_date,
            acwr: opt(a.acwr),
            zone: a.acwr_zone.map(|z| z.as_str().to_string()).unwrap_or_default(),
            monotony: opt(a.monotony),
            score: opt(a.fatigue_score),
            risk: match analysis.correction {
                Some(_) => format!("{}*", a.risk_level),
                None => a.risk_level.to_string(),
            },
        }
    }
}

#[derive(Tabled)]
struct AlertRow {
    id: u64,
    client: u64,
    #[tabled(rename = "type")]
    alert_type: String,
    severity: String,
    state: String,
    created: String,
    title: String,
}

impl From<&FatigueAlert> for AlertRow {
    fn from(alert: &FatigueAlert) -> Self {
        let state = if alert.resolved_at().is_some() {
            "resolved"
        } else if alert.is_unread() {
            "unread"
        } else {
            "read"
        };
        AlertRow {
            id: alert.id.0,
            client: alert.client_id.0,
            alert_type: alert.alert_type.to_string(),
            severity: alert.severity.to_string(),
            state: state.to_string(),
            created: alert.created_at.format("%Y-%m-%d %H:%M").to_string(),
            title: alert.title.clone(),
        }
    }
}

#[derive(Tabled)]
struct SubjectiveRow {
    date: String,
    analysis: u64,
    risk: String,
    #[tabled(rename = "pre fatigue")]
    pre_fatigue: String,
    #[tabled(rename = "post fatigue")]
    post_fatigue: String,
    #[tabled(rename = "pre energy")]
    pre_energy: String,
    #[tabled(rename = "post energy")]
    post_energy: String,
    #[tabled(rename = "energy delta")]
    energy_delta: String,
}

impl From<&SubjectivePoint> for SubjectiveRow {
    fn from(point: &SubjectivePoint) -> Self {
        SubjectiveRow {
            date: point.date.to_string(),
            analysis: point.analysis_id.0,
            risk: point.risk_level.to_string(),
            pre_fatigue: opt(point.pre_fatigue),
            post_fatigue: opt(point.post_fatigue),
            pre_energy: opt(point.pre_energy),
            post_energy: opt(point.post_energy),
            energy_delta: opt(point.energy_delta),
        }
    }
}

fn opt(value: Option<Decimal>) -> String {
    value.map(|v| v.normalize().to_string()).unwrap_or_else(|| "-".to_string())
}

fn table<'a, T, R>(items: &'a [T]) -> String
where
    R: Tabled + From<&'a T>,
{
    Table::new(items.iter().map(R::from))
        .with(Style::rounded())
        .to_string()
}

fn risk_label(risk: RiskLevel) -> ColoredString {
    match risk {
        RiskLevel::Unknown => risk.as_str().dimmed(),
        RiskLevel::Low => risk.as_str().green(),
        RiskLevel::Moderate => risk.as_str().yellow(),
        RiskLevel::High => risk.as_str().red(),
        RiskLevel::Critical => risk.as_str().red().bold(),
    }
}

fn print_analysis(analysis: &FatigueAnalysis) {
    let a = &analysis.assessment;
    println!(
        "{} #{} for client {} on {}",
        "Fatigue analysis".cyan().bold(),
        analysis.id,
        analysis.client_id,
        a.analysis_date
    );
    println!("  Acute load:    {}", a.acute_load.round_dp(1));
    println!("  Chronic load:  {}", a.chronic_load.round_dp(1));
    println!(
        "  ACWR:          {} {}",
        opt(a.acwr),
        a.acwr_zone.map(|z| format!("({})", z.description())).unwrap_or_default()
    );
    println!("  Monotony:      {}", opt(a.monotony));
    println!("  Strain:        {}", opt(a.strain));
    println!("  Fatigue score: {}", opt(a.fatigue_score));
    println!("  Risk:          {}", risk_label(a.risk_level));
    if a.insufficient_data {
        println!("  {}", "Insufficient data for a load-based assessment".dimmed());
    }
    println!("  {}", a.recommendation);
    println!("  Next session: {}", a.next_session_adjustment);
    if let Some(correction) = &analysis.correction {
        println!(
            "  {} by {} at {} (was {})",
            "Corrected".yellow(),
            correction.corrected_by,
            correction.corrected_at.format("%Y-%m-%d %H:%M"),
            correction.previous_risk
        );
    }
}

fn print_alerts(alerts: &[FatigueAlert]) {
    if alerts.is_empty() {
        println!("{}", "No alerts".dimmed());
    } else {
        println!("{}", table::<_, AlertRow>(alerts));
    }
}

fn print_trend(trend: &FatigueTrend) {
    let s = &trend.summary;
    println!(
        "{} client {} from {} to {}",
        "Fatigue trend".cyan().bold(),
        trend.client_id,
        trend.period.start,
        trend.period.end
    );
    println!(
        "  Analyses: {} ({} with insufficient data)",
        s.analysis_count, s.insufficient_data_count
    );
    println!(
        "  Score min/avg/max: {} / {} / {}",
        opt(s.min_score),
        opt(s.average_score),
        opt(s.max_score)
    );
    println!("  Average ACWR: {}", opt(s.average_acwr));
    if let Some(direction) = s.score_trend {
        println!("  Score trend: {:?}", direction);
    }
    println!(
        "  Risk counts: low {}, moderate {}, high {}, critical {}, unknown {}",
        s.risk_counts.low,
        s.risk_counts.moderate,
        s.risk_counts.high,
        s.risk_counts.critical,
        s.risk_counts.unknown
    );
    println!(
        "  Alerts: {} (medium {}, high {}, critical {})",
        s.alerts_by_severity.total(),
        s.alerts_by_severity.medium,
        s.alerts_by_severity.high,
        s.alerts_by_severity.critical
    );
    println!(
        "  Avg fatigue pre/post/delta: {} / {} / {}",
        opt(s.average_pre_fatigue),
        opt(s.average_post_fatigue),
        opt(s.average_fatigue_delta)
    );
    println!(
        "  Avg energy pre/post/delta: {} / {} / {}",
        opt(s.average_pre_energy),
        opt(s.average_post_energy),
        opt(s.average_energy_delta)
    );
    if let Some(risk) = s.latest_risk {
        println!("  Latest risk: {}", risk_label(risk));
    }

    let reported: Vec<SubjectivePoint> = trend
        .subjective
        .iter()
        .filter(|p| {
            [p.pre_fatigue, p.post_fatigue, p.pre_energy, p.post_energy]
                .iter()
                .any(Option::is_some)
        })
        .cloned()
        .collect();
    if !reported.is_empty() {
        println!("{}", table::<_, SubjectiveRow>(&reported));
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli) {
        match err.downcast_ref::<FatigueError>() {
            Some(engine_err) => {
                logging::log_error("cli", engine_err);
                eprintln!("{} {}", "error:".red().bold(), engine_err.user_message());
            }
            None => eprintln!("{} {:#}", "error:".red().bold(), err),
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_config_path);
    let mut config = AppConfig::load_or_default(Some(&config_path))?;
    if let Some(db) = &cli.db {
        config.database_path = db.clone();
    }
    config.logging.level = match cli.verbose {
        0 => config.logging.level,
        1 => LogLevel::Info,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };
    logging::init_logging(&config.logging)?;

    if let Commands::Config { action } = &cli.command {
        return match action {
            ConfigAction::Init { force } => {
                if config_path.exists() && !force {
                    bail!("{} already exists (use --force to overwrite)", config_path.display());
                }
                let mut fresh = AppConfig::default();
                fresh.save_to_file(&config_path)?;
                println!("{} {}", "✓ Wrote".green(), config_path.display());
                Ok(())
            }
            ConfigAction::Show => {
                println!("{}", toml::to_string_pretty(&config)?);
                Ok(())
            }
        };
    }

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create data directory: {}", parent.display()))?;
    }
    let store = SqliteStore::open(&config.database_path)?;
    let engine = FatigueEngine::new(store, config.engine.clone())?;
    let scope = cli.scope.scope()?;

    match cli.command {
        Commands::Client { action } => match action {
            ClientAction::Add { id, owner, name } => {
                engine.register_client(
                    &scope,
                    ClientRef {
                        id: ClientId(id),
                        trainer_id: TrainerId(owner),
                        name,
                    },
                )?;
                println!("{} client {}", "✓ Registered".green(), id);
            }
            ClientAction::List => {
                for client in engine.clients(&scope)? {
                    println!(
                        "{:>6}  trainer {:>4}  {}",
                        client.id,
                        client.trainer_id,
                        client.name.unwrap_or_default()
                    );
                }
            }
        },

        Commands::Record {
            client,
            load,
            rpe,
            at,
            session,
            notes,
        } => {
            let entry = engine.record_workload(
                &scope,
                NewWorkloadEntry {
                    client_id: ClientId(client),
                    timestamp: at.unwrap_or_else(Utc::now),
                    volume_load: load,
                    subjective_load: rpe,
                    session_id: session,
                    notes,
                },
            )?;
            println!("{} entry {} on {}", "✓ Recorded".green(), entry.id, entry.date());
        }

        Commands::UpdateEntry {
            id,
            load,
            rpe,
            at,
            notes,
        } => {
            let update = WorkloadUpdate {
                timestamp: at,
                volume_load: load,
                subjective_load: rpe,
                notes,
            };
            let entry = engine.update_entry(&scope, EntryId(id), update)?;
            println!("{} entry {}", "✓ Updated".green(), entry.id);
        }

        Commands::DeleteEntry { id } => {
            let entry = engine.delete_entry(&scope, EntryId(id))?;
            println!("{} entry {} from {}", "✓ Deleted".green(), entry.id, entry.date());
        }

        Commands::History { client, from, to } => {
            let entries = engine.workload_history(&scope, ClientId(client), from, to)?;
            println!("{}", table::<_, EntryRow>(&entries));
        }

        Commands::Rollups { client, from, to } => {
            let rollups = engine.workload_rollups(&scope, ClientId(client), from, to)?;
            println!("{}", table::<_, RollupRow>(&rollups));
        }

        Commands::Analyze {
            client,
            as_of,
            session,
            subjective,
        } => {
            let outcome = engine.run_analysis(
                &scope,
                AnalysisRequest {
                    client_id: ClientId(client),
                    as_of,
                    session_id: session,
                    subjective: subjective.inputs(),
                },
            )?;
            print_analysis(&outcome.analysis);
            if !outcome.alerts.is_empty() {
                println!("{}", "New alerts".red().bold());
                print_alerts(&outcome.alerts);
            }
        }

        Commands::Correct {
            id,
            risk,
            score,
            notes,
        } => {
            let analysis = engine.correct_analysis(
                &scope,
                AnalysisId(id),
                AnalysisCorrection {
                    corrected_by: cli.scope.user()?,
                    risk_level: risk,
                    fatigue_score: score,
                    notes,
                },
            )?;
            print_analysis(&analysis);
        }

        Commands::Analyses { client, page } => {
            let analyses = match client {
                Some(client) => engine.client_analyses(&scope, ClientId(client), page.page()?)?,
                None => engine.list_analyses(&scope, page.page()?)?,
            };
            println!("{}", table::<_, AnalysisRow>(&analyses));
        }

        Commands::ShowAnalysis { id } => {
            print_analysis(&engine.get_analysis(&scope, AnalysisId(id))?);
        }

        Commands::Trend { client, days, end } => {
            let period = AnalysisPeriod::last_days(end.unwrap_or_else(|| Utc::now().date_naive()), days)?;
            let trend = engine.fatigue_analytics(&scope, ClientId(client), period)?;
            print_trend(&trend);
            if !trend.analyses.is_empty() {
                println!("{}", table::<_, AnalysisRow>(&trend.analyses));
            }
        }

        Commands::Alerts { view } => {
            let alerts = match view {
                AlertView::Unread { page } => engine.list_unread(&scope, page.page()?)?,
                AlertView::Open { client } => engine.list_open(&scope, ClientId(client))?,
                AlertView::List { client, page } => {
                    engine.client_alerts(&scope, ClientId(client), page.page()?)?
                }
            };
            print_alerts(&alerts);
        }

        Commands::Read { id } => {
            let alert = engine.mark_read(&scope, AlertId(id), cli.scope.user()?)?;
            println!("{} alert {}", "✓ Read".green(), alert.id);
        }

        Commands::Resolve { id, notes } => {
            let alert = engine.resolve(&scope, AlertId(id), cli.scope.user()?, notes)?;
            println!("{} alert {}", "✓ Resolved".green(), alert.id);
        }

        Commands::Recompute { as_of } => {
            let report = engine.recompute_all(&scope, as_of)?;
            println!(
                "{} {} clients, {} new alerts",
                "✓ Recomputed".green(),
                report.outcomes.len(),
                report.alerts_raised()
            );
            for (client_id, error) in &report.failures {
                println!("  {} client {}: {}", "✗".red(), client_id, error.user_message());
            }
        }

        Commands::Export {
            what,
            client,
            output,
            format,
            days,
        } => {
            let client_id = ClientId(client);
            let period = AnalysisPeriod::last_days(Utc::now().date_naive(), days)?;
            match what {
                ExportWhat::Analyses => {
                    let analyses = engine.client_analyses(&scope, client_id, Page::new(0, Page::MAX_LIMIT)?)?;
                    export::export(ExportData::Analyses(&analyses), format, &output)?;
                }
                ExportWhat::Alerts => {
                    let alerts = engine.client_alerts(&scope, client_id, Page::new(0, Page::MAX_LIMIT)?)?;
                    export::export(ExportData::Alerts(&alerts), format, &output)?;
                }
                ExportWhat::Workload => {
                    let rollups = engine.workload_rollups(&scope, client_id, period.start, period.end)?;
                    export::export(ExportData::Workload(&rollups), format, &output)?;
                }
                ExportWhat::Trend => {
                    let trend = engine.fatigue_analytics(&scope, client_id, period)?;
                    export::export(ExportData::Trend(&trend), format, &output)?;
                }
            }
            println!("{} {}", "✓ Exported to".green(), output.display());
        }

        Commands::Config { .. } => unreachable!("handled before opening the database"),
    }

    Ok(())
}
