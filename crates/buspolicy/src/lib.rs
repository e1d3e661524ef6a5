//! buspolicy: compile and inspect D-Bus bus access policy.
//!
//! Wires the compiler crates to a TOML configuration and renders load
//! reports for the command line.

pub mod config;
pub mod error;

pub use config::{AppConfig, IdentityConfig, ReportConfig, ResolverKind};
pub use error::{AppError, AppResult};

use buspolicy_compiler::{
    load, FragmentSet, LoadReport, PolicyStore, StaticIdentityResolver, SystemIdentityResolver,
};
use buspolicy_core::IdentityResolver;
use std::fmt::Write as _;
use std::path::PathBuf;

/// Build the identity resolver selected by the configuration.
pub fn build_resolver(identity: &IdentityConfig) -> Box<dyn IdentityResolver> {
    match identity.resolver {
        ResolverKind::System => Box::new(SystemIdentityResolver),
        ResolverKind::Static => {
            let mut resolver = StaticIdentityResolver::new();
            for (name, uid) in &identity.users {
                resolver.insert_user(name.clone(), *uid);
            }
            for (name, gid) in &identity.groups {
                resolver.insert_group(name.clone(), *gid);
            }
            Box::new(resolver)
        }
    }
}

/// The fragments to compile: explicit files when given, otherwise the
/// configured set.
pub fn fragment_set(config: &AppConfig, files: &[PathBuf]) -> FragmentSet {
    if files.is_empty() {
        config.fragments.clone()
    } else {
        FragmentSet::from_files(files.iter().cloned())
    }
}

/// Compile the selected fragments with the configured resolver.
pub fn run_load(config: &AppConfig, files: &[PathBuf]) -> LoadReport {
    let resolver = build_resolver(&config.identity);
    load(&fragment_set(config, files), resolver.as_ref())
}

/// Fail when fragments failed and either `strict` or the configuration asks
/// for it.
pub fn check_status(report: &LoadReport, config: &AppConfig, strict: bool) -> AppResult<()> {
    if report.has_failures() && (strict || config.report.fail_on_error) {
        return Err(AppError::LoadFailed(report.failures.len()));
    }
    Ok(())
}

/// Human-readable load summary.
pub fn render_summary(report: &LoadReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "fragments: {} loaded, {} missing, {} failed",
        report.loaded.len(),
        report.missing.len(),
        report.failures.len()
    );
    for path in &report.loaded {
        let _ = writeln!(out, "  loaded   {}", path.display());
    }
    for path in &report.missing {
        let _ = writeln!(out, "  missing  {}", path.display());
    }
    for failure in &report.failures {
        let _ = writeln!(out, "  FAILED   {}", failure);
    }

    if !report.warnings.is_empty() {
        let _ = writeln!(out, "warnings: {}", report.warnings.len());
        for (path, warning) in &report.warnings {
            let _ = writeln!(
                out,
                "  {}:{}: {}",
                path.display(),
                warning.line,
                warning.message
            );
        }
    }

    let summary = report.store.summary();
    let _ = writeln!(
        out,
        "rules: {} default, {} mandatory, {} for {} user(s), {} for {} group(s), {} total",
        summary.default_rules,
        summary.mandatory_rules,
        summary.user_rules,
        summary.users,
        summary.group_rules,
        summary.groups,
        summary.total()
    );
    if report.discarded_rules > 0 {
        let _ = writeln!(
            out,
            "discarded: {} rule(s) in <policy> blocks without a category",
            report.discarded_rules
        );
    }
    out
}

/// The compiled store as pretty-printed JSON.
pub fn export_json(store: &PolicyStore) -> AppResult<String> {
    Ok(serde_json::to_string_pretty(store)?)
}
