//! Selection evaluator
//!
//! [`CompiledRules`] is built once at the start of a run from the configured
//! [`SelectionRules`]: name patterns are compiled into case-insensitive
//! matchers, attribute letters into masks and age values into absolute
//! cutoffs. [`PairEvaluator`] then classifies every pair against it without
//! recomputing anything per pair.
//!
//! File precedence:
//!
//! 1. Destination-only entries are extras and skip the exclusion chain.
//! 2. The exclusion chain (lonely, newer, older, size, attributes, age, last
//!    access) stops at the first match.
//! 3. The file-name exclusion is applied afterwards in every case and replaces
//!    whatever the earlier steps decided, extras included.
//! 4. Anything left is classified by timestamps.
//! 5. A symbolic-link source can still veto the copy.

use chrono::{DateTime, Local, TimeZone};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use mirrorcp_config::{AgeLimit, MirrorOptions, SelectionRules};
use mirrorcp_io::{DirectoryPair, EntryMetadata, FilePair, PairState};
use mirrorcp_types::{Classification, Error, FileAttributes, ProcessedInfo, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

/// Compiled set of wildcard name patterns
#[derive(Debug, Clone)]
pub struct NameFilter {
    set: GlobSet,
    patterns: Vec<String>,
}

impl NameFilter {
    /// Compile patterns; `*` and `?` are wildcards, everything else is literal
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        let mut pattern_list = Vec::with_capacity(patterns.len());

        for pattern in patterns {
            let pattern = pattern.as_ref();
            let glob = GlobBuilder::new(&literal_classes(pattern))
                .case_insensitive(true)
                .literal_separator(false)
                .backslash_escape(false)
                .build()
                .map_err(|e| {
                    Error::invalid_argument(format!("Invalid name pattern '{}': {}", pattern, e))
                })?;
            builder.add(glob);
            pattern_list.push(pattern.to_string());
        }

        let set = builder
            .build()
            .map_err(|e| Error::invalid_argument(format!("Invalid name patterns: {}", e)))?;
        Ok(Self {
            set,
            patterns: pattern_list,
        })
    }

    /// Whether no pattern was given
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether any pattern matches the whole candidate
    pub fn is_match(&self, candidate: &str) -> bool {
        self.set.is_match(candidate)
    }

    /// Source patterns
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

/// Turn glob metacharacters other than `*` and `?` into single-character classes
fn literal_classes(pattern: &str) -> String {
    let mut escaped = String::with_capacity(pattern.len());
    for ch in pattern.chars() {
        match ch {
            '[' | ']' | '{' | '}' => {
                escaped.push('[');
                escaped.push(ch);
                escaped.push(']');
            }
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Selection rules prepared for one run
#[derive(Debug, Clone)]
pub struct CompiledRules {
    include: NameFilter,
    exclude_files: NameFilter,
    exclude_dirs: NameFilter,
    include_attributes: FileAttributes,
    exclude_attributes: FileAttributes,
    max_file_size: Option<u64>,
    min_file_size: Option<u64>,
    max_age_cutoff: Option<SystemTime>,
    min_age_cutoff: Option<SystemTime>,
    max_access_cutoff: Option<SystemTime>,
    min_access_cutoff: Option<SystemTime>,
    exclude_newer: bool,
    exclude_older: bool,
    exclude_extra: bool,
    exclude_lonely: bool,
    include_same: bool,
    exclude_junction_dirs: bool,
    exclude_symlink_files: bool,
    max_depth: u32,
    purge_enabled: bool,
}

impl CompiledRules {
    /// Compile rules with age cutoffs relative to now
    pub fn compile(rules: &SelectionRules, mirror: &MirrorOptions) -> Result<Self> {
        Self::compile_at(rules, mirror, Local::now())
    }

    /// Compile rules with age cutoffs relative to `now`
    pub fn compile_at(
        rules: &SelectionRules,
        mirror: &MirrorOptions,
        now: DateTime<Local>,
    ) -> Result<Self> {
        Ok(Self {
            include: NameFilter::new(&rules.include_patterns)?,
            exclude_files: NameFilter::new(&rules.exclude_file_patterns)?,
            exclude_dirs: NameFilter::new(&rules.exclude_dir_patterns)?,
            include_attributes: attribute_mask("include_attributes", &rules.include_attributes)?,
            exclude_attributes: attribute_mask("exclude_attributes", &rules.exclude_attributes)?,
            max_file_size: rules.max_file_size,
            min_file_size: rules.min_file_size,
            max_age_cutoff: cutoff("max_file_age", rules.max_file_age, now)?,
            min_age_cutoff: cutoff("min_file_age", rules.min_file_age, now)?,
            max_access_cutoff: cutoff("max_last_access_date", rules.max_last_access_date, now)?,
            min_access_cutoff: cutoff("min_last_access_date", rules.min_last_access_date, now)?,
            exclude_newer: rules.exclude_newer,
            exclude_older: rules.exclude_older,
            exclude_extra: rules.exclude_extra,
            exclude_lonely: rules.exclude_lonely,
            include_same: rules.include_same,
            exclude_junction_dirs: rules.exclude_junction_dirs,
            exclude_symlink_files: rules.exclude_symlink_files,
            max_depth: rules.max_depth,
            purge_enabled: mirror.purge_enabled(),
        })
    }

    /// Maximum depth, root being 1; 0 means unlimited
    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Whether children of a directory at `depth` are visited
    pub fn descends_below(&self, depth: u32) -> bool {
        self.max_depth == 0 || depth < self.max_depth
    }

    /// Whether the rules select every entry of a fresh subtree, so that the
    /// subtree can be moved wholesale
    pub fn selects_everything(&self) -> bool {
        (self.include.is_empty() || self.include.patterns().iter().any(|p| p == "*" || p == "*.*"))
            && self.exclude_files.is_empty()
            && self.exclude_dirs.is_empty()
            && self.include_attributes.is_empty()
            && self.exclude_attributes.is_empty()
            && self.max_file_size.is_none()
            && self.min_file_size.is_none()
            && self.max_age_cutoff.is_none()
            && self.min_age_cutoff.is_none()
            && self.max_access_cutoff.is_none()
            && self.min_access_cutoff.is_none()
            && !self.exclude_lonely
            && !self.exclude_junction_dirs
            && !self.exclude_symlink_files
            && self.max_depth == 0
    }

    /// Include filter; an empty include list matches everything
    pub fn passes_name_filter(&self, name: &str) -> bool {
        self.include.is_empty() || self.include.is_match(name)
    }

    /// File name matches an exclude pattern
    pub fn is_file_excluded(&self, name: &str) -> bool {
        self.exclude_files.is_match(name)
    }

    /// Directory name or either full path matches an exclude pattern
    pub fn is_dir_excluded(&self, name: &str, source: &Path, destination: &Path) -> bool {
        if self.exclude_dirs.is_empty() {
            return false;
        }
        self.exclude_dirs.is_match(name)
            || self.exclude_dirs.is_match(&source.to_string_lossy())
            || self.exclude_dirs.is_match(&destination.to_string_lossy())
    }

    fn purge_eligible(&self, state: &PairState) -> bool {
        self.purge_enabled && state.is_extra() && self.exclude_extra
    }

    /// First exclusion of the chain that applies to a pair with a source
    fn chain_exclusion(&self, state: &PairState, source: &EntryMetadata) -> Option<Classification> {
        if self.exclude_lonely && state.is_lonely() {
            Some(Classification::LonelyExclusion)
        } else if self.exclude_newer && state.is_source_newer() {
            Some(Classification::NewerExclusion)
        } else if self.exclude_older && state.is_destination_newer() {
            Some(Classification::OlderExclusion)
        } else if self.max_file_size.is_some_and(|max| source.len > max) {
            Some(Classification::MaxSizeExclusion)
        } else if self.min_file_size.is_some_and(|min| source.len < min) {
            Some(Classification::MinSizeExclusion)
        } else if !self.attributes_selected(source.attributes) {
            Some(Classification::AttributeExclusion)
        } else if self.max_age_cutoff.is_some_and(|cutoff| source.modified < cutoff) {
            Some(Classification::MaxAgeExclusion)
        } else if self.min_age_cutoff.is_some_and(|cutoff| source.modified > cutoff) {
            Some(Classification::MinAgeExclusion)
        } else if self.max_access_cutoff.is_some_and(|cutoff| source.accessed < cutoff) {
            Some(Classification::MaxLastAccessExclusion)
        } else if self.min_access_cutoff.is_some_and(|cutoff| source.accessed > cutoff) {
            Some(Classification::MinLastAccessExclusion)
        } else {
            None
        }
    }

    fn attributes_selected(&self, attributes: FileAttributes) -> bool {
        if !self.include_attributes.is_empty() && !attributes.intersects(self.include_attributes) {
            return false;
        }
        self.exclude_attributes.is_empty() || !attributes.intersects(self.exclude_attributes)
    }
}

fn attribute_mask(key: &str, letters: &str) -> Result<FileAttributes> {
    FileAttributes::from_letters(letters).ok_or_else(|| {
        Error::invalid_argument(format!(
            "{} '{}' contains letters outside {}",
            key,
            letters,
            FileAttributes::LETTERS
        ))
    })
}

fn cutoff(key: &str, value: Option<u64>, now: DateTime<Local>) -> Result<Option<SystemTime>> {
    let Some(value) = value else {
        return Ok(None);
    };
    let limit = AgeLimit::parse(value).ok_or_else(|| {
        Error::invalid_argument(format!(
            "{} {} is neither a day count nor a YYYYMMDD date",
            key, value
        ))
    })?;

    let instant = match limit {
        AgeLimit::Days(days) => now - chrono::Duration::days(i64::from(days)),
        AgeLimit::Date(date) => {
            let midnight = date.and_hms_opt(0, 0, 0).ok_or_else(|| {
                Error::invalid_argument(format!("{} {} is not a valid date", key, value))
            })?;
            Local
                .from_local_datetime(&midnight)
                .earliest()
                .ok_or_else(|| {
                    Error::invalid_argument(format!("{} {} has no local midnight", key, value))
                })?
        }
    };
    Ok(Some(SystemTime::from(instant)))
}

/// Outcome of evaluating a file pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDecision {
    /// Classification, display name and size
    pub info: ProcessedInfo,
    /// Transfer the source onto the destination
    pub should_copy: bool,
    /// Delete the destination
    pub should_purge: bool,
}

/// Outcome of evaluating a directory pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryDecision {
    /// Classification and display name
    pub info: ProcessedInfo,
    /// Descend into the pair's children
    pub should_recurse: bool,
    /// Delete the destination subtree
    pub should_purge: bool,
}

/// Classifies pairs against compiled rules
#[derive(Debug, Clone)]
pub struct PairEvaluator {
    rules: Arc<CompiledRules>,
}

impl PairEvaluator {
    /// Create an evaluator sharing `rules`
    pub fn new(rules: Arc<CompiledRules>) -> Self {
        Self { rules }
    }

    /// The rules this evaluator applies
    pub fn rules(&self) -> &CompiledRules {
        &self.rules
    }

    /// Include pre-filter applied before evaluation
    pub fn passes_name_filter(&self, name: &str) -> bool {
        self.rules.passes_name_filter(name)
    }

    /// Classify a file pair
    pub fn evaluate_file(&self, pair: &FilePair, state: &PairState) -> FileDecision {
        let rules = &self.rules;
        let name = pair.name();
        let size = state
            .source
            .as_ref()
            .or(state.destination.as_ref())
            .map_or(0, |metadata| metadata.len);

        let mut classification = if state.is_extra() {
            Some(Classification::ExtraFile)
        } else {
            state
                .source
                .as_ref()
                .and_then(|source| rules.chain_exclusion(state, source))
        };

        // Applied regardless of what matched before
        if rules.is_file_excluded(&name) {
            classification = Some(Classification::FileExclusion);
        }

        let (classification, mut should_copy) = match classification {
            Some(classification) => (classification, false),
            None if state.is_lonely() => (Classification::NewFile, !rules.exclude_lonely),
            None if state.is_source_newer() => (Classification::NewerFile, !rules.exclude_newer),
            None if state.is_destination_newer() => {
                (Classification::OlderFile, !rules.exclude_older)
            }
            None => (Classification::SameFile, rules.include_same),
        };

        let source_is_symlink = state.source.as_ref().is_some_and(|m| m.is_symlink);
        should_copy &= state.source_exists() && !(rules.exclude_symlink_files && source_is_symlink);

        let should_purge =
            rules.purge_eligible(state) && classification != Classification::FileExclusion;

        FileDecision {
            info: ProcessedInfo::file(classification, name, size),
            should_copy,
            should_purge,
        }
    }

    /// Classify a directory pair
    pub fn evaluate_directory(&self, pair: &DirectoryPair, state: &PairState) -> DirectoryDecision {
        let rules = &self.rules;
        let name = pair.name();
        let excluded_by_name = rules.is_dir_excluded(&name, pair.source(), pair.destination());
        let is_junction = state.source.as_ref().is_some_and(|m| {
            m.is_symlink || m.attributes.contains(FileAttributes::REPARSE_POINT)
        });

        let (classification, should_recurse) =
            if excluded_by_name || (rules.exclude_junction_dirs && is_junction) {
                (Classification::DirExclusion, false)
            } else if state.exists_both() {
                (Classification::ExistingDir, true)
            } else if state.is_lonely() && !rules.exclude_lonely {
                (Classification::NewDir, true)
            } else if state.is_extra() && !rules.exclude_extra {
                (Classification::ExtraDir, false)
            } else {
                (Classification::DirExclusion, false)
            };

        let display = if state.source_exists() {
            pair.source()
        } else {
            pair.destination()
        };

        DirectoryDecision {
            info: ProcessedInfo::directory(classification, display.to_string_lossy()),
            should_recurse,
            should_purge: rules.purge_eligible(state) && !excluded_by_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirrorcp_io::{FileSystem, MemoryFileSystem};
    use proptest::prelude::*;
    use rstest::rstest;
    use std::time::Duration;

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn evaluator(rules: SelectionRules, mirror: MirrorOptions) -> PairEvaluator {
        PairEvaluator::new(Arc::new(CompiledRules::compile(&rules, &mirror).unwrap()))
    }

    fn file(len: u64, modified: SystemTime) -> Option<EntryMetadata> {
        Some(EntryMetadata::file(len, modified))
    }

    fn pair(name: &str) -> FilePair {
        FilePair::new(format!("/src/{}", name), format!("/dst/{}", name)).unwrap()
    }

    fn state(source: Option<EntryMetadata>, destination: Option<EntryMetadata>) -> PairState {
        PairState {
            source,
            destination,
        }
    }

    #[rstest]
    #[case("*.txt", "notes.TXT", true)]
    #[case("*.txt", "notes.txt.bak", false)]
    #[case("data?.csv", "data1.csv", true)]
    #[case("report[1].pdf", "report[1].pdf", true)]
    #[case("report[1].pdf", "report1.pdf", false)]
    #[case("{a,b}", "{a,b}", true)]
    #[case("*", "anything at all", true)]
    fn test_name_filter(#[case] pattern: &str, #[case] candidate: &str, #[case] expected: bool) {
        let filter = NameFilter::new(&[pattern]).unwrap();
        assert_eq!(filter.is_match(candidate), expected);
    }

    #[test]
    fn test_dir_exclusion_matches_name_or_path() {
        let rules = CompiledRules::compile(
            &SelectionRules {
                exclude_dir_patterns: vec!["node_modules".into(), "/src/build/*".into()],
                ..SelectionRules::default()
            },
            &MirrorOptions::default(),
        )
        .unwrap();

        assert!(rules.is_dir_excluded("node_modules", Path::new("/x/node_modules"), Path::new("/y/node_modules")));
        assert!(rules.is_dir_excluded("out", Path::new("/src/build/out"), Path::new("/dst/build/out")));
        assert!(!rules.is_dir_excluded("src", Path::new("/src/src"), Path::new("/dst/src")));
    }

    #[test]
    fn test_invalid_attribute_letters_fail_compile() {
        let result = CompiledRules::compile(
            &SelectionRules {
                include_attributes: "Z".into(),
                ..SelectionRules::default()
            },
            &MirrorOptions::default(),
        );
        assert!(matches!(result, Err(Error::InvalidArgument { .. })));
    }

    #[test]
    fn test_scenario_new_file_is_copied() {
        let evaluator = evaluator(SelectionRules::default(), MirrorOptions::default());
        let decision = evaluator.evaluate_file(&pair("A"), &state(file(100, at(200)), None));

        assert_eq!(decision.info.classification, Classification::NewFile);
        assert_eq!(decision.info.size_in_bytes, 100);
        assert!(decision.should_copy);
        assert!(!decision.should_purge);
    }

    #[test]
    fn test_scenario_extra_file_is_purged_in_mirror_mode() {
        let rules = SelectionRules {
            exclude_extra: true,
            ..SelectionRules::default()
        };
        let evaluator = evaluator(rules, MirrorOptions::mirror());
        let decision = evaluator.evaluate_file(&pair("B"), &state(None, file(10, at(100))));

        assert_eq!(decision.info.classification, Classification::ExtraFile);
        assert!(!decision.should_copy);
        assert!(decision.should_purge);
    }

    #[test]
    fn test_extra_file_not_purged_without_purge_mode() {
        let rules = SelectionRules {
            exclude_extra: true,
            ..SelectionRules::default()
        };
        let evaluator = evaluator(rules, MirrorOptions::default());
        let decision = evaluator.evaluate_file(&pair("B"), &state(None, file(10, at(100))));
        assert!(!decision.should_purge);
    }

    #[test]
    fn test_scenario_same_file_is_skipped() {
        let evaluator = evaluator(SelectionRules::default(), MirrorOptions::default());
        let decision =
            evaluator.evaluate_file(&pair("C"), &state(file(10, at(100)), file(10, at(100))));

        assert_eq!(decision.info.classification, Classification::SameFile);
        assert!(!decision.should_copy);
    }

    #[test]
    fn test_scenario_min_size_exclusion() {
        let rules = SelectionRules {
            min_file_size: Some(1000),
            ..SelectionRules::default()
        };
        let evaluator = evaluator(rules, MirrorOptions::default());
        let decision =
            evaluator.evaluate_file(&pair("D"), &state(file(500, at(200)), file(500, at(100))));

        assert_eq!(decision.info.classification, Classification::MinSizeExclusion);
        assert!(!decision.should_copy);
    }

    #[test]
    fn test_first_chain_exclusion_wins() {
        let rules = SelectionRules {
            exclude_newer: true,
            max_file_size: Some(10),
            ..SelectionRules::default()
        };
        let evaluator = evaluator(rules, MirrorOptions::default());
        let decision =
            evaluator.evaluate_file(&pair("big"), &state(file(500, at(200)), file(500, at(100))));
        assert_eq!(decision.info.classification, Classification::NewerExclusion);
    }

    // The name check runs after the chain and overrides its result, extras included
    #[test]
    fn test_file_name_exclusion_overrides_earlier_matches() {
        let rules = SelectionRules {
            exclude_file_patterns: vec!["*.tmp".into()],
            min_file_size: Some(1000),
            exclude_extra: true,
            ..SelectionRules::default()
        };
        let evaluator = evaluator(rules, MirrorOptions::mirror());

        let small = evaluator.evaluate_file(&pair("a.tmp"), &state(file(5, at(200)), None));
        assert_eq!(small.info.classification, Classification::FileExclusion);

        let extra = evaluator.evaluate_file(&pair("b.tmp"), &state(None, file(5, at(200))));
        assert_eq!(extra.info.classification, Classification::FileExclusion);
        assert!(!extra.should_purge);
        assert!(!extra.should_copy);
    }

    #[rstest]
    #[case("A", true)]
    #[case("H", false)]
    fn test_attribute_masks(#[case] include: &str, #[case] expected_copy: bool) {
        let rules = SelectionRules {
            include_attributes: include.into(),
            ..SelectionRules::default()
        };
        let evaluator = evaluator(rules, MirrorOptions::default());
        // EntryMetadata::file carries the archive attribute
        let decision = evaluator.evaluate_file(&pair("x"), &state(file(1, at(1)), None));
        assert_eq!(decision.should_copy, expected_copy);
        if !expected_copy {
            assert_eq!(decision.info.classification, Classification::AttributeExclusion);
        }
    }

    #[test]
    fn test_exclude_attributes() {
        let rules = SelectionRules {
            exclude_attributes: "H".into(),
            ..SelectionRules::default()
        };
        let evaluator = evaluator(rules, MirrorOptions::default());
        let mut hidden = EntryMetadata::file(1, at(1));
        hidden.attributes |= FileAttributes::HIDDEN;

        let decision = evaluator.evaluate_file(&pair(".secret"), &state(Some(hidden), None));
        assert_eq!(decision.info.classification, Classification::AttributeExclusion);
    }

    #[test]
    fn test_age_cutoffs() {
        let now = SystemTime::now();
        let old = now - Duration::from_secs(30 * 86_400);
        let recent = now - Duration::from_secs(3600);

        let max_age = evaluator(
            SelectionRules {
                max_file_age: Some(10),
                ..SelectionRules::default()
            },
            MirrorOptions::default(),
        );
        assert_eq!(
            max_age.evaluate_file(&pair("old"), &state(file(1, old), None)).info.classification,
            Classification::MaxAgeExclusion
        );
        assert!(max_age.evaluate_file(&pair("new"), &state(file(1, recent), None)).should_copy);

        let min_age = evaluator(
            SelectionRules {
                min_file_age: Some(10),
                ..SelectionRules::default()
            },
            MirrorOptions::default(),
        );
        assert_eq!(
            min_age.evaluate_file(&pair("new"), &state(file(1, recent), None)).info.classification,
            Classification::MinAgeExclusion
        );

        let max_access = evaluator(
            SelectionRules {
                max_last_access_date: Some(10),
                ..SelectionRules::default()
            },
            MirrorOptions::default(),
        );
        assert_eq!(
            max_access.evaluate_file(&pair("old"), &state(file(1, old), None)).info.classification,
            Classification::MaxLastAccessExclusion
        );
    }

    #[test]
    fn test_date_cutoff() {
        let evaluator = evaluator(
            SelectionRules {
                max_file_age: Some(20000101),
                ..SelectionRules::default()
            },
            MirrorOptions::default(),
        );
        // 1990 predates the cutoff date, 2020 does not
        let decision = evaluator.evaluate_file(&pair("a"), &state(file(1, at(631_152_000)), None));
        assert_eq!(decision.info.classification, Classification::MaxAgeExclusion);
        let decision = evaluator.evaluate_file(&pair("b"), &state(file(1, at(1_577_836_800)), None));
        assert!(decision.should_copy);
    }

    #[test]
    fn test_symlink_source_veto() {
        let rules = SelectionRules {
            exclude_symlink_files: true,
            ..SelectionRules::default()
        };
        let evaluator = evaluator(rules, MirrorOptions::default());
        let mut link = EntryMetadata::file(1, at(1));
        link.is_symlink = true;

        let decision = evaluator.evaluate_file(&pair("link"), &state(Some(link), None));
        assert_eq!(decision.info.classification, Classification::NewFile);
        assert!(!decision.should_copy);
    }

    #[test]
    fn test_temporal_classification() {
        let evaluator = evaluator(
            SelectionRules {
                include_same: true,
                exclude_older: true,
                ..SelectionRules::default()
            },
            MirrorOptions::default(),
        );
        let newer = evaluator.evaluate_file(&pair("n"), &state(file(1, at(20)), file(1, at(10))));
        assert_eq!(newer.info.classification, Classification::NewerFile);
        assert!(newer.should_copy);

        let same = evaluator.evaluate_file(&pair("s"), &state(file(1, at(10)), file(1, at(10))));
        assert_eq!(same.info.classification, Classification::SameFile);
        assert!(same.should_copy);

        let older = evaluator.evaluate_file(&pair("o"), &state(file(1, at(5)), file(1, at(10))));
        assert_eq!(older.info.classification, Classification::OlderExclusion);
        assert!(!older.should_copy);
    }

    fn directory_pair(fs: &Arc<MemoryFileSystem>, name: &str) -> DirectoryPair {
        let fs: Arc<dyn FileSystem> = fs.clone();
        DirectoryPair::new(format!("/src/{}", name), format!("/dst/{}", name), fs).unwrap()
    }

    #[test]
    fn test_directory_classification() {
        let fs = Arc::new(MemoryFileSystem::new());
        fs.add_dir("/src/both");
        fs.add_dir("/dst/both");
        fs.add_dir("/src/new");
        fs.add_dir("/dst/gone");
        fs.add_dir("/src/.git");

        let rules = SelectionRules {
            exclude_dir_patterns: vec![".git".into()],
            ..SelectionRules::default()
        };
        let evaluator = evaluator(rules, MirrorOptions::default());
        let classify = |name: &str| {
            let pair = directory_pair(&fs, name);
            let state = pair.state();
            evaluator.evaluate_directory(&pair, &state)
        };

        let both = classify("both");
        assert_eq!(both.info.classification, Classification::ExistingDir);
        assert!(both.should_recurse);

        let new = classify("new");
        assert_eq!(new.info.classification, Classification::NewDir);
        assert!(new.should_recurse);

        let gone = classify("gone");
        assert_eq!(gone.info.classification, Classification::ExtraDir);
        assert!(!gone.should_recurse);
        assert!(!gone.should_purge);

        let git = classify(".git");
        assert_eq!(git.info.classification, Classification::DirExclusion);
        assert!(!git.should_recurse);
    }

    #[test]
    fn test_extra_directory_purge_in_mirror_mode() {
        let fs = Arc::new(MemoryFileSystem::new());
        fs.add_dir("/dst/gone");
        let rules = SelectionRules {
            exclude_extra: true,
            ..SelectionRules::default()
        };
        let evaluator = evaluator(rules, MirrorOptions::mirror());
        let pair = directory_pair(&fs, "gone");

        let decision = evaluator.evaluate_directory(&pair, &pair.state());
        assert!(decision.should_purge);
        assert!(!decision.should_recurse);
    }

    #[test]
    fn test_junction_exclusion() {
        let fs = Arc::new(MemoryFileSystem::new());
        let mut link = EntryMetadata::directory(at(1));
        link.is_symlink = true;
        fs.insert(Path::new("/src/link"), link);

        let rules = SelectionRules {
            exclude_junction_dirs: true,
            ..SelectionRules::default()
        };
        let evaluator = evaluator(rules, MirrorOptions::default());
        let pair = directory_pair(&fs, "link");
        let decision = evaluator.evaluate_directory(&pair, &pair.state());
        assert_eq!(decision.info.classification, Classification::DirExclusion);
    }

    #[test]
    fn test_selects_everything() {
        let mirror = MirrorOptions::default();
        assert!(CompiledRules::compile(&SelectionRules::default(), &mirror)
            .unwrap()
            .selects_everything());
        let filtered = SelectionRules {
            exclude_file_patterns: vec!["*.bak".into()],
            ..SelectionRules::default()
        };
        assert!(!CompiledRules::compile(&filtered, &mirror)
            .unwrap()
            .selects_everything());
    }

    fn arb_rules() -> impl Strategy<Value = SelectionRules> {
        (
            any::<bool>(),
            any::<bool>(),
            any::<bool>(),
            any::<bool>(),
            any::<bool>(),
            proptest::option::of(0u64..2000),
            proptest::option::of(0u64..2000),
        )
            .prop_map(
                |(exclude_newer, exclude_older, exclude_extra, exclude_lonely, include_same, max, min)| {
                    SelectionRules {
                        exclude_newer,
                        exclude_older,
                        exclude_extra,
                        exclude_lonely,
                        include_same,
                        max_file_size: max,
                        min_file_size: min,
                        ..SelectionRules::default()
                    }
                },
            )
    }

    proptest! {
        #[test]
        fn test_destination_only_is_always_extra(
            rules in arb_rules(),
            mirror in any::<bool>(),
            len in 0u64..5000,
            secs in 0u64..1_000_000,
        ) {
            let options = if mirror { MirrorOptions::mirror() } else { MirrorOptions::default() };
            let evaluator = evaluator(rules.clone(), options);
            let decision = evaluator.evaluate_file(&pair("e"), &state(None, file(len, at(secs))));

            prop_assert_eq!(decision.info.classification, Classification::ExtraFile);
            prop_assert!(!decision.should_copy);
            prop_assert_eq!(decision.should_purge, mirror && rules.exclude_extra);
        }

        #[test]
        fn test_source_only_is_new_unless_excluded(
            exclude_lonely in any::<bool>(),
            len in 0u64..5000,
            secs in 0u64..1_000_000,
        ) {
            let rules = SelectionRules { exclude_lonely, ..SelectionRules::default() };
            let evaluator = evaluator(rules, MirrorOptions::default());
            let decision = evaluator.evaluate_file(&pair("l"), &state(file(len, at(secs)), None));

            let expected = if exclude_lonely {
                Classification::LonelyExclusion
            } else {
                Classification::NewFile
            };
            prop_assert_eq!(decision.info.classification, expected);
            prop_assert_eq!(decision.should_copy, !exclude_lonely);
        }
    }
}
