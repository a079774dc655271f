use std::io::Read;
use std::process::ExitCode;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use fleetplan_core::{ClusterField, ResourceDescriptor};
use fleetplan_placement::{ClusterExclusion, ConstraintDiagnostic, Engine, EngineConfig};
use fleetplan_schema::{lint, load_clusters, load_policies, load_resources, PolicyIssue, PropagationPolicy};
use fleetplan_select::{select_resources, MatchDebugInfo};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "fleetplanctl", version, about = "Propagation placement engine CLI")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Print collected metrics (Prometheus text format) to stderr before exiting
    #[arg(long = "metrics", global = true, action = ArgAction::SetTrue)]
    metrics: bool,

    /// Act as this scheduler; policies naming another scheduler are skipped
    /// [default: $FLEETPLAN_SCHEDULER_NAME, then default-scheduler]
    #[arg(long = "scheduler-name", global = true)]
    scheduler_name: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve target clusters (and matched resources) for every policy
    Resolve {
        /// PropagationPolicy YAML/JSON ("-" for stdin)
        #[arg(long = "policy")]
        policy: String,
        /// Cluster inventory YAML/JSON
        #[arg(long = "clusters")]
        clusters: String,
        /// Resource manifests; without it only placement is reported
        #[arg(long = "resources")]
        resources: Option<String>,
        /// Include exclusion reasons and selector stage counters
        #[arg(long = "explain", action = ArgAction::SetTrue)]
        explain: bool,
    },
    /// Run resource selectors only
    Match {
        #[arg(long = "policy")]
        policy: String,
        #[arg(long = "resources")]
        resources: String,
        #[arg(long = "explain", action = ArgAction::SetTrue)]
        explain: bool,
    },
    /// Report structural problems in policies; exits non-zero when any are found
    Lint {
        #[arg(long = "policy")]
        policy: String,
    },
    /// List the cluster fields usable in fieldSelector and spreadByField
    Fields,
}

fn init_tracing() {
    let env = std::env::var("FLEETPLAN_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics(enabled: bool) -> Option<PrometheusHandle> {
    if !enabled { return None; }
    match metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "failed to install metrics recorder");
            None
        }
    }
}

fn read_input(path: &str) -> Result<String> {
    if path == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).context("reading stdin")?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path))
}

fn resource_line(r: &ResourceDescriptor) -> String { format!("{}/{} {}", r.api_version, r.kind, r.key()) }

/// Policies this scheduler is responsible for; the rest are logged and dropped.
fn owned<'p>(engine: &Engine, policies: &'p [PropagationPolicy]) -> Vec<&'p PropagationPolicy> {
    policies
        .iter()
        .filter(|p| {
            let mine = engine.owns(&p.spec);
            if !mine {
                info!(policy = %p.key(), scheduler = ?p.spec.scheduler_name, "skipping policy for another scheduler");
                metrics::counter!("fleetplan_policies_skipped_total", 1u64);
            }
            mine
        })
        .collect()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PolicyReport {
    policy: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    resources: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    match_debug: Option<MatchDebugInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    selected_clusters: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    diagnostics: Vec<ConstraintDiagnostic>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exclusions: Option<Vec<ClusterExclusion>>,
}

fn resolve_reports(
    engine: &Engine,
    policies: &[PropagationPolicy],
    clusters: &[fleetplan_core::ClusterDescriptor],
    resources: Option<&[ResourceDescriptor]>,
    explain: bool,
) -> Vec<PolicyReport> {
    owned(engine, policies)
        .into_iter()
        .map(|p| {
            let eval = engine.evaluate(&p.spec, clusters, resources.unwrap_or(&[]));
            let with_resources = resources.is_some();
            PolicyReport {
                policy: p.key(),
                resources: with_resources.then(|| eval.matched.items.iter().map(|r| resource_line(r)).collect()),
                match_debug: (with_resources && explain).then_some(eval.matched.debug),
                selected_clusters: Some(eval.placement.selected_clusters),
                diagnostics: eval.placement.diagnostics,
                exclusions: explain.then_some(eval.placement.exclusions),
            }
        })
        .collect()
}

fn match_reports(engine: &Engine, policies: &[PropagationPolicy], resources: &[ResourceDescriptor], explain: bool) -> Vec<PolicyReport> {
    owned(engine, policies)
        .into_iter()
        .map(|p| {
            let matched = select_resources(p.spec.resource_selectors.as_deref(), resources);
            PolicyReport {
                policy: p.key(),
                resources: Some(matched.items.iter().map(|r| resource_line(r)).collect()),
                match_debug: explain.then_some(matched.debug),
                selected_clusters: None,
                diagnostics: Vec::new(),
                exclusions: None,
            }
        })
        .collect()
}

fn print_human(reports: &[PolicyReport]) {
    if reports.is_empty() {
        println!("(no policies for this scheduler)");
    }
    for r in reports {
        println!("policy {}", r.policy);
        if let Some(clusters) = r.selected_clusters.as_ref() {
            if clusters.is_empty() {
                println!("  clusters: (none)");
            } else {
                println!("  clusters: {}", clusters.join(", "));
            }
        }
        for d in r.diagnostics.iter() {
            let by = d.spread_by.as_deref().unwrap_or("-");
            let state = if d.satisfied { "satisfied" } else { "UNSATISFIED" };
            println!(
                "  constraint #{} {} units={} selected=[{}] {}",
                d.index,
                by,
                d.units_found,
                d.selected_units.iter().map(|u| if u.is_empty() { "<none>" } else { u.as_str() }).collect::<Vec<_>>().join(","),
                state
            );
            if let Some(reason) = d.reason.as_deref() {
                println!("    reason: {}", reason);
            }
        }
        if let Some(resources) = r.resources.as_ref() {
            println!("  resources ({}):", resources.len());
            for line in resources {
                println!("    {}", line);
            }
        }
        if let Some(exclusions) = r.exclusions.as_ref() {
            for e in exclusions {
                println!("  excluded {}: {}", e.cluster, e.reason);
            }
        }
        if let Some(dbg) = r.match_debug.as_ref() {
            eprintln!(
                "debug: total={} selectors={} after_kind={} after_names={} after_namespaces={} after_excluded={} after_labels={} matched={}",
                dbg.total, dbg.selectors, dbg.after_kind, dbg.after_names, dbg.after_namespaces, dbg.after_excluded, dbg.after_labels, dbg.matched
            );
        }
    }
}

#[derive(Debug, Serialize)]
struct LintReport {
    policy: String,
    issues: Vec<PolicyIssue>,
}

fn lint_reports(policies: &[PropagationPolicy]) -> Vec<LintReport> {
    policies.iter().map(|p| LintReport { policy: p.key(), issues: lint(&p.spec) }).collect()
}

/// `--scheduler-name` wins over the environment.
fn engine_config(flag: Option<&str>) -> EngineConfig {
    match flag {
        Some(_) => EngineConfig::named(flag),
        None => EngineConfig::from_env(),
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let engine = Engine::new(engine_config(cli.scheduler_name.as_deref()));
    match cli.command {
        Commands::Resolve { policy, clusters, resources, explain } => {
            let policies = load_policies(&read_input(&policy)?).with_context(|| format!("loading policies from {}", policy))?;
            let inventory = load_clusters(&read_input(&clusters)?).with_context(|| format!("loading clusters from {}", clusters))?;
            let resources = match resources.as_deref() {
                Some(path) => Some(load_resources(&read_input(path)?).with_context(|| format!("loading resources from {}", path))?),
                None => None,
            };
            info!(policies = policies.len(), clusters = inventory.len(), "resolve invoked");
            let reports = resolve_reports(&engine, &policies, &inventory, resources.as_deref(), explain);
            match cli.output {
                Output::Human => print_human(&reports),
                Output::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
            }
        }
        Commands::Match { policy, resources, explain } => {
            let policies = load_policies(&read_input(&policy)?).with_context(|| format!("loading policies from {}", policy))?;
            let resources = load_resources(&read_input(&resources)?).with_context(|| format!("loading resources from {}", resources))?;
            info!(policies = policies.len(), resources = resources.len(), "match invoked");
            let reports = match_reports(&engine, &policies, &resources, explain);
            match cli.output {
                Output::Human => print_human(&reports),
                Output::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
            }
        }
        Commands::Lint { policy } => {
            let policies = load_policies(&read_input(&policy)?).with_context(|| format!("loading policies from {}", policy))?;
            let reports = lint_reports(&policies);
            let total: usize = reports.iter().map(|r| r.issues.len()).sum();
            match cli.output {
                Output::Human => {
                    for r in reports.iter() {
                        for issue in r.issues.iter() {
                            println!("{}: {}", r.policy, issue);
                        }
                    }
                    println!("{} issue(s) in {} policy(ies)", total, reports.len());
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
            }
            if total > 0 { return Ok(ExitCode::FAILURE); }
        }
        Commands::Fields => match cli.output {
            Output::Human => {
                for f in ClusterField::ALL {
                    println!("{}", f);
                }
            }
            Output::Json => {
                let names: Vec<&str> = ClusterField::ALL.iter().map(|f| f.as_str()).collect();
                println!("{}", serde_json::to_string_pretty(&names)?);
            }
        },
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();
    let metrics = init_metrics(cli.metrics);
    let code = run(cli);
    if let Some(handle) = metrics {
        eprintln!("{}", handle.render());
    }
    code
}
