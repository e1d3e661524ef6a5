//! Load orchestration: compile an ordered fragment set into one store.
//!
//! Loading is best-effort. A fragment that is missing is skipped quietly; a
//! fragment that fails to read or compile is logged, recorded in the
//! [`LoadReport`], and the remaining fragments still load.

use buspolicy_core::IdentityResolver;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{CompileResult, FragmentError};
use crate::machine::{compile, CompileOutcome, CompileWarning};
use crate::store::PolicyStore;
use crate::xml::XmlTokenSource;

// ---------------------------------------------------------------------------
// FragmentSet — which files to compile, and in what order
// ---------------------------------------------------------------------------

/// Ordered fragment sources: the primary files in the order given, then the
/// drop-in files of each directory sorted by file name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FragmentSet {
    pub primary: Vec<PathBuf>,
    pub drop_in_dirs: Vec<PathBuf>,
    /// Only drop-in files whose name ends with this are compiled.
    pub suffix: String,
}

impl Default for FragmentSet {
    fn default() -> Self {
        Self::system()
    }
}

impl FragmentSet {
    /// The system bus layout under `/etc/dbus-1`.
    pub fn system() -> Self {
        Self {
            primary: vec![
                PathBuf::from("/etc/dbus-1/system.conf"),
                PathBuf::from("/etc/dbus-1/system-local.conf"),
            ],
            drop_in_dirs: vec![PathBuf::from("/etc/dbus-1/system.d")],
            suffix: ".conf".to_string(),
        }
    }

    /// Exactly these files, in this order, with no drop-in directories.
    pub fn from_files(files: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            primary: files.into_iter().collect(),
            drop_in_dirs: Vec::new(),
            suffix: ".conf".to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_empty() && self.drop_in_dirs.is_empty()
    }

    /// Resolve the ordered list of fragment paths.
    ///
    /// A drop-in directory that does not exist contributes nothing. One that
    /// cannot be listed is returned as a failure alongside the paths that
    /// could be resolved.
    pub fn paths(&self) -> (Vec<PathBuf>, Vec<FragmentError>) {
        let mut paths = self.primary.clone();
        let mut failures = Vec::new();

        for dir in &self.drop_in_dirs {
            match self.list_drop_ins(dir) {
                Ok(mut found) => paths.append(&mut found),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    tracing::debug!(dir = %dir.display(), "drop-in directory absent");
                }
                Err(source) => failures.push(FragmentError::Io {
                    path: dir.clone(),
                    source,
                }),
            }
        }
        (paths, failures)
    }

    fn list_drop_ins(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let mut found = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let matches_suffix = entry
                .file_name()
                .to_str()
                .map_or(false, |name| name.ends_with(&self.suffix));
            let path = entry.path();
            if matches_suffix && path.is_file() {
                found.push(path);
            }
        }
        found.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(found)
    }
}

// ---------------------------------------------------------------------------
// Single fragments
// ---------------------------------------------------------------------------

/// Compile in-memory busconfig text into `store`. `origin` names the text in
/// diagnostics.
pub fn compile_str(
    store: &mut PolicyStore,
    text: &str,
    origin: &str,
    resolver: &dyn IdentityResolver,
) -> CompileResult<CompileOutcome> {
    let mut source = XmlTokenSource::new(text);
    compile(&mut source, store, resolver, origin)
}

/// Read and compile one fragment file. `Ok(None)` means the file does not
/// exist.
pub fn compile_fragment(
    store: &mut PolicyStore,
    path: &Path,
    resolver: &dyn IdentityResolver,
) -> Result<Option<CompileOutcome>, FragmentError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(FragmentError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    tracing::debug!(path = %path.display(), "compiling fragment");
    let origin = path.display().to_string();
    compile_str(store, &text, &origin, resolver)
        .map(Some)
        .map_err(|source| FragmentError::Compile {
            path: path.to_path_buf(),
            source,
        })
}

// ---------------------------------------------------------------------------
// Whole fragment sets
// ---------------------------------------------------------------------------

/// The compiled store together with everything that happened on the way.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub store: PolicyStore,
    pub loaded: Vec<PathBuf>,
    pub missing: Vec<PathBuf>,
    pub failures: Vec<FragmentError>,
    pub warnings: Vec<(PathBuf, CompileWarning)>,
    pub discarded_rules: usize,
}

impl LoadReport {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Compile every fragment of `set` in order into a fresh store.
pub fn load(set: &FragmentSet, resolver: &dyn IdentityResolver) -> LoadReport {
    let (paths, listing_failures) = set.paths();
    let mut report = LoadReport::default();

    for failure in listing_failures {
        tracing::error!("{}", failure);
        report.failures.push(failure);
    }

    for path in paths {
        match compile_fragment(&mut report.store, &path, resolver) {
            Ok(Some(outcome)) => {
                report.discarded_rules += outcome.discarded_rules;
                report
                    .warnings
                    .extend(outcome.warnings.into_iter().map(|w| (path.clone(), w)));
                report.loaded.push(path);
            }
            Ok(None) => {
                tracing::debug!(path = %path.display(), "fragment missing, skipped");
                report.missing.push(path);
            }
            Err(failure) => {
                tracing::error!("{}", failure);
                report.failures.push(failure);
            }
        }
    }

    tracing::info!(
        loaded = report.loaded.len(),
        missing = report.missing.len(),
        failed = report.failures.len(),
        rules = report.store.len(),
        "policy load complete"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompileErrorKind;
    use crate::identity::StaticIdentityResolver;
    use std::fs;
    use tempfile::TempDir;

    fn make_resolver() -> StaticIdentityResolver {
        StaticIdentityResolver::new().with_user("alice", 1000)
    }

    fn make_fragment(own: &str) -> String {
        format!(
            r#"<busconfig><policy context="default"><allow own="{}"/></policy></busconfig>"#,
            own
        )
    }

    fn owned_names(store: &PolicyStore) -> Vec<String> {
        store
            .default_rules()
            .iter()
            .filter_map(|r| r.target_name().map(str::to_string))
            .collect()
    }

    #[test]
    fn test_system_defaults() {
        let set = FragmentSet::system();
        assert_eq!(set.primary[0], PathBuf::from("/etc/dbus-1/system.conf"));
        assert_eq!(set.primary[1], PathBuf::from("/etc/dbus-1/system-local.conf"));
        assert_eq!(set.drop_in_dirs, vec![PathBuf::from("/etc/dbus-1/system.d")]);
        assert_eq!(set.suffix, ".conf");
        assert_eq!(FragmentSet::default(), set);
    }

    #[test]
    fn test_paths_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        let drop_in = dir.path().join("system.d");
        fs::create_dir(&drop_in).unwrap();
        for name in ["b.conf", "a.conf", "c.conf.bak", "README", "0-early.conf"] {
            fs::write(drop_in.join(name), "").unwrap();
        }
        fs::create_dir(drop_in.join("dir.conf")).unwrap();

        let set = FragmentSet {
            primary: vec![dir.path().join("main.conf")],
            drop_in_dirs: vec![drop_in.clone(), dir.path().join("absent.d")],
            suffix: ".conf".into(),
        };
        let (paths, failures) = set.paths();
        assert!(failures.is_empty());
        assert_eq!(
            paths,
            vec![
                dir.path().join("main.conf"),
                drop_in.join("0-early.conf"),
                drop_in.join("a.conf"),
                drop_in.join("b.conf"),
            ]
        );
    }

    #[test]
    fn test_unlistable_drop_in_is_failure() {
        let dir = TempDir::new().unwrap();
        let not_a_dir = dir.path().join("file.d");
        fs::write(&not_a_dir, "").unwrap();

        let set = FragmentSet {
            primary: vec![],
            drop_in_dirs: vec![not_a_dir.clone()],
            suffix: ".conf".into(),
        };
        let (paths, failures) = set.paths();
        assert!(paths.is_empty());
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].path(), not_a_dir.as_path());
    }

    #[test]
    fn test_compile_fragment_missing_is_none() {
        let dir = TempDir::new().unwrap();
        let mut store = PolicyStore::new();
        let result =
            compile_fragment(&mut store, &dir.path().join("nope.conf"), &make_resolver()).unwrap();
        assert!(result.is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_compile_fragment_error_carries_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.conf");
        fs::write(
            &path,
            "<busconfig>\n<policy context=\"default\">\n<allow/>\n</policy>\n</busconfig>\n",
        )
        .unwrap();

        let mut store = PolicyStore::new();
        let err = compile_fragment(&mut store, &path, &make_resolver()).unwrap_err();
        assert_eq!(err.path(), path.as_path());
        assert_eq!(err.line(), Some(3));
        assert!(err.to_string().ends_with(&format!("at {}:3", path.display())));
        match err {
            FragmentError::Compile { source, .. } => {
                assert_eq!(source.kind(), CompileErrorKind::ClassNotSet)
            }
            other => panic!("expected compile failure, got {:?}", other),
        }
    }

    #[test]
    fn test_later_fragments_take_precedence() {
        let dir = TempDir::new().unwrap();
        let drop_in = dir.path().join("system.d");
        fs::create_dir(&drop_in).unwrap();
        fs::write(dir.path().join("system.conf"), make_fragment("A")).unwrap();
        fs::write(drop_in.join("10-b.conf"), make_fragment("B")).unwrap();
        fs::write(drop_in.join("20-c.conf"), make_fragment("C")).unwrap();

        let set = FragmentSet {
            primary: vec![dir.path().join("system.conf")],
            drop_in_dirs: vec![drop_in],
            suffix: ".conf".into(),
        };
        let report = load(&set, &make_resolver());
        assert!(!report.has_failures());
        assert_eq!(report.loaded.len(), 3);
        assert_eq!(owned_names(&report.store), vec!["C", "B", "A"]);
    }

    #[test]
    fn test_missing_fragment_does_not_abort() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("present.conf"), make_fragment("kept")).unwrap();

        let set = FragmentSet::from_files(vec![
            dir.path().join("absent.conf"),
            dir.path().join("present.conf"),
        ]);
        let report = load(&set, &make_resolver());
        assert!(!report.has_failures());
        assert_eq!(report.missing, vec![dir.path().join("absent.conf")]);
        assert_eq!(report.loaded, vec![dir.path().join("present.conf")]);
        assert_eq!(owned_names(&report.store), vec!["kept"]);
    }

    #[test]
    fn test_failing_fragment_does_not_abort() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("1.conf"), make_fragment("first")).unwrap();
        fs::write(
            dir.path().join("2.conf"),
            r#"<busconfig><policy context="default"><allow own="partial"/><allow send_interface="a" receive_sender="b"/></policy></busconfig>"#,
        )
        .unwrap();
        fs::write(dir.path().join("3.conf"), make_fragment("third")).unwrap();

        let set = FragmentSet::from_files(
            ["1.conf", "2.conf", "3.conf"].map(|n| dir.path().join(n)),
        );
        let report = load(&set, &make_resolver());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path(), dir.path().join("2.conf").as_path());
        assert_eq!(report.loaded.len(), 2);
        // rules emitted before the failure stay in the store
        assert_eq!(owned_names(&report.store), vec!["third", "partial", "first"]);
    }

    #[test]
    fn test_report_collects_warnings_and_discards() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("console.conf");
        fs::write(
            &path,
            r#"<busconfig><policy at_console="true"><allow own="x"/></policy></busconfig>"#,
        )
        .unwrap();

        let report = load(&FragmentSet::from_files(vec![path.clone()]), &make_resolver());
        assert_eq!(report.discarded_rules, 1);
        assert_eq!(report.warnings.len(), 2);
        assert!(report.warnings.iter().all(|(p, _)| *p == path));
        assert!(report.store.is_empty());
    }

    #[test]
    fn test_compile_str_uses_resolver() {
        let mut store = PolicyStore::new();
        let outcome = compile_str(
            &mut store,
            r#"<busconfig><policy user="alice"><deny send_destination="org.x"/></policy></busconfig>"#,
            "inline",
            &make_resolver(),
        )
        .unwrap();
        assert_eq!(outcome.rules_added, 1);
        assert_eq!(
            store.user_rules(buspolicy_core::Uid(1000)).unwrap().len(),
            1
        );
    }

    #[test]
    fn test_fragment_set_partial_deserialize() {
        let set: FragmentSet = serde_json::from_str(r#"{"primary": ["/tmp/x.conf"]}"#).unwrap();
        assert_eq!(set.primary, vec![PathBuf::from("/tmp/x.conf")]);
        assert_eq!(set.suffix, ".conf");
        assert_eq!(set.drop_in_dirs, FragmentSet::system().drop_in_dirs);
        assert!(!set.is_empty());
        assert!(FragmentSet::from_files(Vec::new()).is_empty());
    }
}
