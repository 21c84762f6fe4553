use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use homehealth::export::{cell, float_cell, TextTable};
use homehealth::market::CompetitorAnalysis;
use homehealth::prelude::*;
use homehealth::quality::ProviderComparison;
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hhcli", version)]
#[command(about = "Home health coverage CLI - find care deserts, size markets and benchmark agencies", long_about = None)]
struct Cli {
    /// SQLite database (overrides the configured path)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show coverage statistics for the database
    Stats(OutputArgs),
    /// List ZIP codes with Medicare demand and few providers in reach
    Deserts(DesertArgs),
    /// Totals by severity tier and state
    DesertSummary(StateArgs),
    /// Providers nearest to a ZIP code
    Nearest(NearestArgs),
    /// Market size over a set of ZIP codes
    Market(MarketArgs),
    /// Underserved ZIP codes near an existing provider
    Expand(ExpandArgs),
    /// Compare a provider's quality against its peers
    Compare(CompareArgs),
    /// Quality score distribution, nationally or for a state
    Benchmarks(StateArgs),
    /// A provider's standing among nearby competitors
    Competitors(CompetitorArgs),
    /// Providers and concentration within a county
    County(CountyArgs),
    /// Filter providers by location, quality and services
    Search(SearchArgs),
    /// Providers by rural-urban continuum code, density and frontier status
    RuralUrban(OutputArgs),
    /// Rural and urban provider mix per state
    RuralStates(StateArgs),
    /// Providers per population density category
    Density(OutputArgs),
    /// Market view of a core-based statistical area
    Cbsa(CbsaArgs),
    /// Provider totals for every CBSA
    CbsaSummary(OutputArgs),
    /// Provider totals for every county
    Counties(OutputArgs),
    /// ZIP codes a provider reports serving
    Coverage(CcnArgs),
    /// Nearby ZIP codes with demand and few registered providers
    Gaps(CcnArgs),
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Jsonl,
    Csv,
}

#[derive(Args)]
struct OutputArgs {
    /// Output format (table on a terminal, the configured format with --output)
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,
    /// Write to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Limit number of rows
    #[arg(long)]
    limit: Option<usize>,
}

#[derive(Args)]
struct StateArgs {
    /// Two-letter state code
    #[arg(long)]
    state: Option<String>,
    #[command(flatten)]
    out: OutputArgs,
}

#[derive(Args)]
struct DesertArgs {
    #[arg(long)]
    state: Option<String>,
    /// Only rural ZIP codes
    #[arg(long)]
    rural_only: bool,
    /// Search radius in miles
    #[arg(long)]
    radius: Option<f64>,
    /// Minimum Medicare-eligible population
    #[arg(long)]
    min_population: Option<u64>,
    /// Most providers in radius for a ZIP to count as a desert
    #[arg(long)]
    max_providers: Option<usize>,
    #[command(flatten)]
    out: OutputArgs,
}

#[derive(Args)]
struct NearestArgs {
    zip: String,
    #[arg(long, default_value_t = homehealth::proximity::DEFAULT_NEAREST_RADIUS_MILES)]
    radius: f64,
    #[command(flatten)]
    out: OutputArgs,
}

#[derive(Args)]
struct MarketArgs {
    /// ZIP codes to aggregate
    #[arg(required = true, num_args = 1..)]
    zips: Vec<String>,
    #[command(flatten)]
    out: OutputArgs,
}

#[derive(Args)]
struct ExpandArgs {
    /// CMS Certification Number
    ccn: String,
    /// Search radius in miles (defaults to the configured value)
    #[arg(long)]
    radius: Option<f64>,
    #[command(flatten)]
    out: OutputArgs,
}

#[derive(Args)]
struct CompareArgs {
    ccn: String,
    /// state, county or national
    #[arg(long, default_value = "state")]
    scope: ComparisonScope,
    #[command(flatten)]
    out: OutputArgs,
}

#[derive(Args)]
struct CompetitorArgs {
    ccn: String,
    /// state, county or city
    #[arg(long, default_value = "state")]
    scope: CompetitorScope,
    #[command(flatten)]
    out: OutputArgs,
}

#[derive(Args)]
struct CountyArgs {
    county: String,
    #[arg(long)]
    state: String,
    #[command(flatten)]
    out: OutputArgs,
}

#[derive(Args)]
struct CbsaArgs {
    /// CBSA name or part of it, e.g. "Jackson, MS"
    name: String,
    #[command(flatten)]
    out: OutputArgs,
}

#[derive(Args)]
struct CcnArgs {
    /// CMS Certification Number
    ccn: String,
    #[command(flatten)]
    out: OutputArgs,
}

#[derive(Args)]
struct SearchArgs {
    #[arg(long)]
    state: Option<String>,
    #[arg(long)]
    city: Option<String>,
    #[arg(long)]
    county: Option<String>,
    /// Substring of the provider name
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    ownership: Option<String>,
    /// Service offered, e.g. nursing or physical-therapy
    #[arg(long)]
    service: Option<Service>,
    #[arg(long)]
    min_quality: Option<f64>,
    #[arg(long)]
    high_quality: bool,
    #[arg(long)]
    rural_only: bool,
    #[command(flatten)]
    out: OutputArgs,
}

/// Where and how a command writes its result
struct Output {
    /// `None` renders a text table
    format: Option<ExportFormat>,
    path: Option<PathBuf>,
    limit: Option<usize>,
    table_limit: usize,
}

impl Output {
    fn new(args: &OutputArgs, config: &AppConfig) -> Self {
        let format = match args.format {
            Some(OutputFormat::Table) => None,
            Some(OutputFormat::Json) => Some(ExportFormat::Json),
            Some(OutputFormat::Jsonl) => Some(ExportFormat::JsonLines),
            Some(OutputFormat::Csv) => Some(ExportFormat::Csv),
            None if args.output.is_some() => Some(config.default_export_format),
            None => None,
        };
        Output {
            format,
            path: args.output.clone(),
            limit: args.limit,
            table_limit: args.limit.unwrap_or(config.result_limit),
        }
    }

    fn writer(&self) -> anyhow::Result<Box<dyn Write>> {
        Ok(match &self.path {
            Some(path) => {
                let file = File::create(path)
                    .with_context(|| format!("cannot create output file {}", path.display()))?;
                Box::new(BufWriter::new(file))
            }
            None => Box::new(io::stdout().lock()),
        })
    }

    /// Rows kept for machine-readable output
    fn rows<'a, T>(&self, rows: &'a [T]) -> &'a [T] {
        match self.limit {
            Some(limit) => &rows[..rows.len().min(limit)],
            None => rows,
        }
    }

    /// JSON gets the whole report; JSON Lines and CSV get the flat `rows`
    fn emit<T: Serialize, U: Serialize>(
        &self,
        report: &T,
        rows: &[U],
        table: impl FnOnce(usize) -> String,
    ) -> anyhow::Result<()> {
        let mut writer = self.writer()?;
        match self.format {
            None => writer.write_all(table(self.table_limit).as_bytes())?,
            Some(ExportFormat::Json) => write_report(report, ExportFormat::Json, &mut writer)?,
            Some(format) => write_rows(self.rows(rows), format, &mut writer)?,
        }
        writer.flush()?;
        if let Some(path) = &self.path {
            eprintln!("Wrote {}", path.display());
        }
        Ok(())
    }

    fn emit_rows<U: Serialize>(&self, rows: &[U], table: impl FnOnce(usize) -> String) -> anyhow::Result<()> {
        let kept: Vec<&U> = self.rows(rows).iter().collect();
        self.emit(&kept, rows, table)
    }
}

fn init_logging(verbose: u8, configured: &str) {
    let default_level = match verbose {
        0 => configured.to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        match err.downcast_ref::<HomeHealthError>() {
            Some(e) => eprintln!("Error: {}", e.user_message()),
            None => eprintln!("Error: {:#}", err),
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = AppConfig::load(cli.config.as_deref())?;
    init_logging(cli.verbose, &config.log_level);

    let db = config.resolve_database_path(cli.db.as_deref());
    debug!(path = %db.display(), "opening database");
    let repository = SqliteRepository::open(&db)?;
    let analytics = HomeHealthAnalytics::with_config(CachedRepository::new(repository), &config);

    match cli.command {
        Commands::Stats(out) => cmd_stats(&analytics, Output::new(&out, &config)),
        Commands::Deserts(args) => {
            let output = Output::new(&args.out, &config);
            cmd_deserts(&analytics, args, output)
        }
        Commands::DesertSummary(args) => {
            let output = Output::new(&args.out, &config);
            cmd_desert_summary(&analytics, args.state.as_deref(), output)
        }
        Commands::Nearest(args) => {
            let output = Output::new(&args.out, &config);
            cmd_nearest(&analytics, &args.zip, args.radius, output)
        }
        Commands::Market(args) => {
            let output = Output::new(&args.out, &config);
            cmd_market(&analytics, &args.zips, output)
        }
        Commands::Expand(args) => {
            let output = Output::new(&args.out, &config);
            cmd_expand(&analytics, &args.ccn, args.radius, output)
        }
        Commands::Compare(args) => {
            let output = Output::new(&args.out, &config);
            cmd_compare(&analytics, &args.ccn, args.scope, output)
        }
        Commands::Benchmarks(args) => {
            let output = Output::new(&args.out, &config);
            cmd_benchmarks(&analytics, args.state.as_deref(), output)
        }
        Commands::Competitors(args) => {
            let output = Output::new(&args.out, &config);
            cmd_competitors(&analytics, &args.ccn, args.scope, output)
        }
        Commands::County(args) => {
            let output = Output::new(&args.out, &config);
            cmd_county(&analytics, &args.county, &args.state, output)
        }
        Commands::Search(args) => {
            let output = Output::new(&args.out, &config);
            cmd_search(&analytics, args, output)
        }
        Commands::RuralUrban(out) => cmd_rural_urban(&analytics, Output::new(&out, &config)),
        Commands::RuralStates(args) => {
            let output = Output::new(&args.out, &config);
            cmd_rural_states(&analytics, args.state.as_deref(), output)
        }
        Commands::Density(out) => cmd_density(&analytics, Output::new(&out, &config)),
        Commands::Cbsa(args) => {
            let output = Output::new(&args.out, &config);
            cmd_cbsa(&analytics, &args.name, output)
        }
        Commands::CbsaSummary(out) => cmd_cbsa_summary(&analytics, Output::new(&out, &config)),
        Commands::Counties(out) => cmd_counties(&analytics, Output::new(&out, &config)),
        Commands::Coverage(args) => {
            let output = Output::new(&args.out, &config);
            cmd_coverage(&analytics, &args.ccn, output)
        }
        Commands::Gaps(args) => {
            let output = Output::new(&args.out, &config);
            cmd_gaps(&analytics, &args.ccn, output)
        }
    }
}

type Analytics = HomeHealthAnalytics<CachedRepository<SqliteRepository>>;

fn provider_table(providers: &[ProviderSummary], limit: usize) -> String {
    let mut table = TextTable::new(&["CCN", "Name", "City", "State", "Quality", "HQ", "Patients", "Miles"]);
    for p in providers.iter().take(limit) {
        table.add_row(vec![
            p.ccn.to_string(),
            cell(p.name.as_deref()),
            cell(p.city.as_deref()),
            cell(p.state.as_deref()),
            float_cell(p.composite_quality_score, 2),
            if p.is_high_quality { "yes".to_string() } else { String::new() },
            float_cell(p.estimated_total_patients, 0),
            float_cell(p.distance_miles, 1),
        ]);
    }
    format!("{}{} of {} providers shown\n", table.render(), table.len(), providers.len())
}

fn desert_table(results: &[CoverageDesertResult], limit: usize) -> String {
    let mut table = TextTable::new(&["ZIP", "City", "State", "Eligible", "Enrolled", "Providers", "Severity", "Score"]);
    for r in results.iter().take(limit) {
        table.add_row(vec![
            r.zip_code.to_string(),
            cell(r.city.as_deref()),
            cell(r.state.as_deref()),
            cell(r.medicare_eligible),
            cell(r.medicare_enrolled),
            r.providers_within_radius.to_string(),
            r.desert_severity.to_string(),
            format!("{:.1}", r.market_opportunity_score),
        ]);
    }
    format!("{}{} of {} ZIP codes shown\n", table.render(), table.len(), results.len())
}

fn cmd_stats(analytics: &Analytics, output: Output) -> anyhow::Result<()> {
    let stats = analytics.statistics()?;
    output.emit(&stats, std::slice::from_ref(&stats), |_| {
        let mut table = TextTable::new(&["Metric", "Value"]);
        let rows = [
            ("Providers", stats.total_providers),
            ("With enhanced coordinates", stats.providers_with_enhanced_coordinates),
            ("With original county", stats.providers_with_original_county),
            ("With enhanced county", stats.providers_with_enhanced_county),
            ("With any county", stats.providers_with_any_county),
            ("High quality", stats.high_quality_providers),
            ("States represented", stats.states_represented),
            ("ZIP records", stats.zip_records),
            ("ZIP records with coordinates", stats.zip_records_with_coordinates),
            ("Rural ZIP records", stats.rural_zip_records),
        ];
        for (metric, value) in rows {
            table.add_row(vec![metric.to_string(), value.to_string()]);
        }
        table.render()
    })
}

fn cmd_deserts(analytics: &Analytics, args: DesertArgs, output: Output) -> anyhow::Result<()> {
    let mut criteria = analytics
        .desert_criteria()
        .state(args.state.as_deref())
        .rural_only(args.rural_only);
    if let Some(radius) = args.radius {
        criteria = criteria.radius(radius);
    }
    if let Some(min) = args.min_population {
        criteria = criteria.min_population(min);
    }
    if let Some(max) = args.max_providers {
        criteria = criteria.max_providers(max);
    }

    let results = analytics.classify_deserts(&criteria)?;
    output.emit_rows(&results, |limit| desert_table(&results, limit))
}

fn cmd_desert_summary(analytics: &Analytics, state: Option<&str>, output: Output) -> anyhow::Result<()> {
    let summary = analytics.desert_summary(state)?;
    output.emit(&summary, &summary.state_breakdown, |limit| {
        let mut tiers = TextTable::new(&["Tier", "Max providers", "ZIPs", "Medicare enrolled", "Score"]);
        for tier in [&summary.complete_deserts, &summary.severe_underservice, &summary.moderate_underservice] {
            tiers.add_row(vec![
                tier.severity.to_string(),
                tier.max_providers_in_radius.to_string(),
                tier.zip_count.to_string(),
                tier.medicare_population.to_string(),
                format!("{:.1}", tier.total_opportunity_score),
            ]);
        }
        let mut states = TextTable::new(&["State", "ZIPs", "Eligible", "Enrolled", "Score"]);
        for s in summary.state_breakdown.iter().take(limit) {
            states.add_row(vec![
                s.state.clone(),
                s.underserved_zips.to_string(),
                s.medicare_eligible.to_string(),
                s.medicare_enrolled.to_string(),
                format!("{:.1}", s.total_opportunity_score),
            ]);
        }
        format!(
            "{}\nUnderserved ZIPs: {}  Medicare population: {}  States: {}  Avg score: {}\n\n{}",
            tiers.render(),
            summary.total_underserved_zips,
            summary.total_underserved_medicare_population,
            summary.states_with_deserts,
            float_cell(summary.avg_opportunity_score_per_zip, 1),
            states.render()
        )
    })
}

fn cmd_nearest(analytics: &Analytics, zip: &str, radius: f64, output: Output) -> anyhow::Result<()> {
    let nearest = analytics.nearest_providers(zip, radius)?;
    let rows: Vec<ProviderSummary> = nearest.providers.iter().map(ProviderSummary::from).collect();
    output.emit(&nearest, &rows, |limit| {
        format!(
            "Providers within {} miles of {} ({}, {})\n\n{}",
            nearest.max_radius_miles,
            nearest.target.zip_code,
            cell(nearest.target.city.as_deref()),
            cell(nearest.target.state.as_deref()),
            provider_table(&rows, limit)
        )
    })
}

fn cmd_market(analytics: &Analytics, zips: &[String], output: Output) -> anyhow::Result<()> {
    let report = analytics.market_potential(zips)?;
    let summary = &report.market_summary;
    output.emit(&report, std::slice::from_ref(summary), |_| {
        let mut table = TextTable::new(&["Metric", "Value"]);
        table.add_row(vec!["ZIP codes".to_string(), summary.total_zip_codes.to_string()]);
        table.add_row(vec!["States".to_string(), summary.states_covered.to_string()]);
        table.add_row(vec!["Counties".to_string(), summary.counties_covered.to_string()]);
        table.add_row(vec!["Population".to_string(), summary.total_population.to_string()]);
        table.add_row(vec!["Medicare eligible".to_string(), summary.total_medicare_eligibles.to_string()]);
        table.add_row(vec!["Medicare enrolled".to_string(), summary.total_medicare_enrolled.to_string()]);
        table.add_row(vec!["Avg penetration %".to_string(), format!("{:.2}", summary.avg_medicare_penetration_pct)]);
        table.add_row(vec!["Rural ZIPs".to_string(), summary.rural_zip_count.to_string()]);
        table.add_row(vec![
            "North-south miles".to_string(),
            format!("{:.1}", report.geographic_span.approximate_miles_north_south),
        ]);
        table.add_row(vec![
            "East-west miles".to_string(),
            format!("{:.1}", report.geographic_span.approximate_miles_east_west),
        ]);
        table.add_row(vec![
            "Est. annual value".to_string(),
            format!("${:.0}", report.market_opportunity.estimated_annual_market_value),
        ]);
        let mut text = table.render();
        if !report.discarded_inputs.is_empty() {
            text.push_str(&format!("\nIgnored malformed input: {}\n", report.discarded_inputs.join(", ")));
        }
        if !report.unmatched_zip_codes.is_empty() {
            let unmatched: Vec<String> = report.unmatched_zip_codes.iter().map(|z| z.to_string()).collect();
            text.push_str(&format!("No data for: {}\n", unmatched.join(", ")));
        }
        text
    })
}

fn cmd_expand(analytics: &Analytics, ccn: &str, radius: Option<f64>, output: Output) -> anyhow::Result<()> {
    let report = analytics.expansion_opportunities(ccn, radius)?;
    output.emit(&report, &report.all_opportunities, |limit| {
        let mut table = TextTable::new(&["ZIP", "City", "County", "Eligible", "Providers", "Severity", "Score", "Miles"]);
        for o in report.top_targets.iter().take(limit) {
            table.add_row(vec![
                o.zip_code.to_string(),
                cell(o.city.as_deref()),
                cell(o.county.as_deref()),
                cell(o.medicare_eligible),
                o.providers_within_radius.to_string(),
                o.desert_severity.to_string(),
                format!("{:.1}", o.market_opportunity_score),
                format!("{:.1}", o.distance_from_provider),
            ]);
        }
        format!(
            "{} ({}) - {} opportunities within {} miles, population {}, avg distance {:.1} mi\n\n{}",
            cell(report.provider.name.as_deref()),
            report.provider.ccn,
            report.summary.total_desert_opportunities,
            report.summary.search_radius_miles,
            report.summary.total_opportunity_population,
            report.summary.average_distance_miles,
            table.render()
        )
    })
}

fn comparison_text(c: &ProviderComparison, limit: usize) -> String {
    format!(
        "{} ({}) score {}\nRank {} of {} ({} scope), percentile {:.1}, z-score {:.2}\nPeer mean {:.2}, median {:.2}\n\nTop performers\n{}",
        cell(c.target.name.as_deref()),
        c.target.ccn,
        float_cell(c.target.composite_quality_score, 2),
        c.comparison.provider_rank,
        c.comparison.total_providers,
        c.comparison.scope,
        c.comparison.percentile,
        c.comparison.z_score,
        c.market.mean,
        c.market.median,
        provider_table(&c.top_performers, limit)
    )
}

fn cmd_compare(analytics: &Analytics, ccn: &str, scope: ComparisonScope, output: Output) -> anyhow::Result<()> {
    let comparison = analytics.provider_comparison(ccn, scope)?;
    output.emit(&comparison, std::slice::from_ref(&comparison.comparison), |limit| {
        comparison_text(&comparison, limit)
    })
}

fn cmd_benchmarks(analytics: &Analytics, state: Option<&str>, output: Output) -> anyhow::Result<()> {
    let benchmarks = analytics.quality_benchmarks(state)?;
    output.emit(&benchmarks, std::slice::from_ref(&benchmarks.percentiles), |_| {
        let p = &benchmarks.percentiles;
        let d = &benchmarks.distribution;
        let mut table = TextTable::new(&["Metric", "Value"]);
        table.add_row(vec!["Scope".to_string(), benchmarks.state.clone().unwrap_or_else(|| "national".to_string())]);
        table.add_row(vec!["Providers".to_string(), benchmarks.total_providers.to_string()]);
        table.add_row(vec!["Mean".to_string(), format!("{:.2}", benchmarks.mean_quality)]);
        table.add_row(vec!["Median".to_string(), format!("{:.2}", benchmarks.median_quality)]);
        table.add_row(vec!["Std dev".to_string(), float_cell(benchmarks.std_quality, 2)]);
        table.add_row(vec![
            "P10/P25/P75/P90".to_string(),
            format!("{:.2} / {:.2} / {:.2} / {:.2}", p.p10, p.p25, p.p75, p.p90),
        ]);
        table.add_row(vec![
            "Stars 5/4/3/2/1".to_string(),
            format!("{} / {} / {} / {} / {}", d.five_star, d.four_star, d.three_star, d.two_star, d.one_star),
        ]);
        table.add_row(vec!["High quality".to_string(), benchmarks.high_quality_count.to_string()]);
        table.render()
    })
}

fn competitor_text(c: &CompetitorAnalysis, limit: usize) -> String {
    format!(
        "{} ({}) ranks {} of {} in {} scope, share {:.1}%, percentile {:.1}\n\n{}",
        cell(c.target.name.as_deref()),
        c.target.ccn,
        c.rank,
        c.total_competitors + 1,
        c.scope,
        c.market_share * 100.0,
        c.percentile_rank,
        provider_table(&c.top_competitors, limit)
    )
}

fn cmd_competitors(analytics: &Analytics, ccn: &str, scope: CompetitorScope, output: Output) -> anyhow::Result<()> {
    let analysis = analytics.competitor_analysis(ccn, scope)?;
    output.emit(&analysis, &analysis.top_competitors, |limit| competitor_text(&analysis, limit))
}

fn cmd_county(analytics: &Analytics, county: &str, state: &str, output: Output) -> anyhow::Result<()> {
    let analysis = analytics.county_market_analysis(county, state)?;
    output.emit(&analysis, &analysis.providers, |limit| {
        format!(
            "{} County, {}: {} providers, {} high quality ({:.1}%), avg score {}, HHI {:.3}\n\n{}",
            analysis.county,
            analysis.state,
            analysis.total_providers,
            analysis.high_quality_providers,
            analysis.high_quality_percentage,
            float_cell(analysis.average_quality_score, 2),
            analysis.market_concentration_index,
            provider_table(&analysis.providers, limit)
        )
    })
}

fn cmd_search(analytics: &Analytics, args: SearchArgs, output: Output) -> anyhow::Result<()> {
    let mut filter = ProviderFilter::new();
    if let Some(state) = &args.state {
        filter = filter.state(state);
    }
    if let Some(city) = &args.city {
        filter = filter.city_contains(city);
    }
    if let Some(county) = &args.county {
        filter = filter.county_contains(county);
    }
    if let Some(name) = &args.name {
        filter = filter.name_contains(name);
    }
    if let Some(ownership) = &args.ownership {
        filter = filter.ownership_contains(ownership);
    }
    if let Some(service) = args.service {
        filter = filter.offers(service);
    }
    if let Some(min) = args.min_quality {
        filter = filter.min_quality(min);
    }
    if args.high_quality {
        filter = filter.high_quality_only();
    }
    if args.rural_only {
        filter = filter.rural_only();
    }
    debug!(predicates = ?filter.describe(), "searching providers");

    let providers = analytics.search_providers(&filter)?;
    let rows: Vec<ProviderSummary> = providers.iter().map(ProviderSummary::from).collect();
    output.emit_rows(&rows, |limit| provider_table(&rows, limit))
}

fn cmd_rural_urban(analytics: &Analytics, output: Output) -> anyhow::Result<()> {
    let analysis = analytics.rural_urban_analysis()?;
    output.emit(&analysis, &analysis.rucc_distribution, |limit| {
        let mut rucc = TextTable::new(&["RUCC", "Category", "Providers", "Avg quality", "HQ", "Patients"]);
        for g in analysis.rucc_distribution.iter().take(limit) {
            rucc.add_row(vec![
                g.rucc_description.clone(),
                cell(g.rucc_category.as_deref()),
                g.provider_count.to_string(),
                float_cell(g.avg_quality_score, 2),
                g.high_quality_count.to_string(),
                format!("{:.0}", g.total_estimated_patients),
            ]);
        }
        let mut areas = TextTable::new(&["Area", "Providers", "Avg quality", "HQ", "States", "Counties"]);
        for g in &analysis.rural_urban_comparison {
            areas.add_row(vec![
                g.area_type.to_string(),
                g.provider_count.to_string(),
                float_cell(g.avg_quality_score, 2),
                g.high_quality_count.to_string(),
                g.states_covered.to_string(),
                g.counties_covered.to_string(),
            ]);
        }
        let frontier = &analysis.frontier_stats;
        format!(
            "{}\n{}\nFrontier: {} providers, avg quality {:.2}, {:.0} estimated patients\n",
            rucc.render(),
            areas.render(),
            frontier.total_providers,
            frontier.avg_quality_score,
            frontier.total_estimated_patients
        )
    })
}

fn cmd_rural_states(analytics: &Analytics, state: Option<&str>, output: Output) -> anyhow::Result<()> {
    let summary = analytics.state_rural_urban_summary(state)?;
    output.emit_rows(&summary, |limit| {
        let mut table = TextTable::new(&["State", "Providers", "Rural", "Urban", "Frontier", "Rural %", "Rural Q", "Urban Q"]);
        for s in summary.iter().take(limit) {
            table.add_row(vec![
                s.state.clone(),
                s.total_providers.to_string(),
                s.rural_providers.to_string(),
                s.urban_providers.to_string(),
                s.frontier_providers.to_string(),
                format!("{:.1}", s.rural_percentage),
                float_cell(s.rural_avg_quality, 2),
                float_cell(s.urban_avg_quality, 2),
            ]);
        }
        table.render()
    })
}

fn cmd_density(analytics: &Analytics, output: Output) -> anyhow::Result<()> {
    let categories = analytics.density_category_analysis()?;
    output.emit_rows(&categories, |limit| {
        let mut table = TextTable::new(&["Density", "Providers", "States", "Avg quality", "HQ", "HQ %", "Patients"]);
        for c in categories.iter().take(limit) {
            table.add_row(vec![
                c.density_category.clone(),
                c.provider_count.to_string(),
                c.states_covered.to_string(),
                float_cell(c.avg_quality_score, 2),
                c.high_quality_count.to_string(),
                format!("{:.1}", c.high_quality_percentage),
                format!("{:.0}", c.total_estimated_patients),
            ]);
        }
        table.render()
    })
}

fn cmd_cbsa(analytics: &Analytics, name: &str, output: Output) -> anyhow::Result<()> {
    let analysis = analytics.cbsa_analysis(name)?;
    output.emit(&analysis, &analysis.providers, |limit| {
        format!(
            "{} - {} providers, {} counties, {:.1}% high quality, HHI {:.3}\n\n{}",
            analysis.cbsa_name,
            analysis.total_providers,
            analysis.unique_counties,
            analysis.high_quality_percentage,
            analysis.market_concentration_index,
            provider_table(&analysis.top_providers, limit)
        )
    })
}

fn cmd_cbsa_summary(analytics: &Analytics, output: Output) -> anyhow::Result<()> {
    let summary = analytics.cbsa_summary()?;
    output.emit_rows(&summary, |limit| {
        let mut table = TextTable::new(&["Code", "CBSA", "Metro type", "Providers", "Counties", "HQ", "Avg quality"]);
        for c in summary.iter().take(limit) {
            table.add_row(vec![
                cell(c.cbsa_code.as_deref()),
                c.cbsa_name.clone(),
                cell(c.metro_type.as_deref()),
                c.unique_providers.to_string(),
                c.unique_counties.to_string(),
                c.high_quality_count.to_string(),
                float_cell(c.avg_quality_score, 2),
            ]);
        }
        format!("{}{} of {} CBSAs shown\n", table.render(), table.len(), summary.len())
    })
}

fn cmd_counties(analytics: &Analytics, output: Output) -> anyhow::Result<()> {
    let counties = analytics.county_summary()?;
    output.emit_rows(&counties, |limit| {
        let mut table = TextTable::new(&["County", "State", "Providers", "HQ", "Avg quality", "Patients"]);
        for c in counties.iter().take(limit) {
            table.add_row(vec![
                c.county_name.clone(),
                cell(c.state.as_deref()),
                c.unique_providers.to_string(),
                c.high_quality_count.to_string(),
                float_cell(c.avg_quality_score, 2),
                format!("{:.0}", c.total_estimated_patients),
            ]);
        }
        format!("{}{} of {} counties shown\n", table.render(), table.len(), counties.len())
    })
}

fn cmd_coverage(analytics: &Analytics, ccn: &str, output: Output) -> anyhow::Result<()> {
    let coverage = analytics.service_area_coverage(ccn)?;
    let stats = &coverage.coverage_stats;
    output.emit(&coverage, std::slice::from_ref(stats), |limit| {
        let served: Vec<String> = coverage.zip_codes_served.iter().take(limit).map(|z| z.to_string()).collect();
        format!(
            "{} ({}) based in {}, {}\n{} ZIP codes ({} not in the crosswalk), {} cities, {} counties, {} states\nMedicare eligible {}, enrolled {}\n\n{}\n",
            cell(coverage.provider_name.as_deref()),
            coverage.ccn,
            cell(coverage.home_base.city.as_deref()),
            cell(coverage.home_base.state.as_deref()),
            stats.total_zip_codes,
            stats.unmatched_zip_codes,
            stats.total_cities,
            stats.total_counties,
            stats.total_states,
            stats.total_medicare_eligible,
            stats.total_medicare_enrolled,
            served.join(" ")
        )
    })
}

fn cmd_gaps(analytics: &Analytics, ccn: &str, output: Output) -> anyhow::Result<()> {
    let report = analytics.service_area_gaps(ccn)?;
    output.emit(&report, &report.gap_areas, |limit| {
        let mut table = TextTable::new(&["ZIP", "City", "County", "Eligible", "Enrolled", "Providers", "Score", "Miles"]);
        for g in report.top_opportunities.iter().take(limit) {
            table.add_row(vec![
                g.zip_code.to_string(),
                cell(g.city.as_deref()),
                cell(g.county.as_deref()),
                cell(g.medicare_eligible),
                cell(g.medicare_enrolled),
                g.provider_count.to_string(),
                format!("{:.1}", g.opportunity_score),
                format!("{:.1}", g.distance_miles),
            ]);
        }
        format!(
            "{} ({}) - {} gap areas, {} Medicare enrolled, avg distance {:.1} mi\n\n{}",
            cell(report.provider_name.as_deref()),
            report.ccn,
            report.summary.total_gap_areas,
            report.summary.underserved_population,
            report.summary.average_distance_miles,
            table.render()
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_radius_defaults_to_100_miles() {
        let cli = Cli::try_parse_from(["hhcli", "nearest", "39201"]).unwrap();
        match cli.command {
            Commands::Nearest(args) => {
                assert_eq!(args.zip, "39201");
                assert_eq!(args.radius, 100.0);
            }
            _ => panic!("expected the nearest command"),
        }
    }

    #[test]
    fn test_service_area_subcommands_parse() {
        let cli = Cli::try_parse_from(["hhcli", "gaps", "250001", "--format", "csv"]).unwrap();
        assert!(matches!(cli.command, Commands::Gaps(ref args) if args.ccn == "250001"));

        let cli = Cli::try_parse_from(["hhcli", "rural-states", "--state", "MT"]).unwrap();
        assert!(matches!(cli.command, Commands::RuralStates(ref args) if args.state.as_deref() == Some("MT")));
        assert!(Cli::try_parse_from(["hhcli", "cbsa"]).is_err());
    }
}
