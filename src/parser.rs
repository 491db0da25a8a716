use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::dialect;
use crate::error::{EngineError, Result};
use crate::exclusions::{self, CoverageRegion, ExclusionZone};
use crate::mutants::{CandidateMutation, LineIndex, MutationId, sanitized_stem};
use crate::operators::{self, MutationOperatorKind};
use crate::schemata::{self, SchemataMapping};
use crate::visitors::{self, FileContext};
use crate::{Language, detect_language};

#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    pub operators: Vec<MutationOperatorKind>,
    pub exclude_calls: Vec<String>,
    pub coverage: Vec<CoverageRegion>,
    pub activation_check: Option<String>,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        DiscoveryOptions {
            operators: MutationOperatorKind::ALL.to_vec(),
            exclude_calls: Vec::new(),
            coverage: Vec::new(),
            activation_check: None,
        }
    }
}

/// One source file after discovery and rewriting.
#[derive(Debug, Clone)]
pub struct InstrumentedFile {
    pub path: PathBuf,
    pub language: Language,
    pub original: String,
    pub instrumented: String,
    pub mapping: SchemataMapping,
    pub zones: Vec<ExclusionZone>,
}

#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct Discovery {
    pub files: Vec<InstrumentedFile>,
    pub mapping: SchemataMapping,
    pub skipped: Vec<SkippedFile>,
}

impl Discovery {
    pub fn candidates(&self) -> Vec<&CandidateMutation> {
        self.mapping.candidates()
    }
}

/// Hands out id stems. A stem already claimed by another path gets a short
/// hash of the path appended, so ids stay unique across the project.
#[derive(Debug, Default)]
pub struct IdAllocator {
    claimed: HashMap<String, PathBuf>,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stem_for(&mut self, path: &Path) -> String {
        let stem = sanitized_stem(path);
        match self.claimed.get(&stem) {
            Some(owner) if owner != path => {
                let digest = Sha256::digest(path.to_string_lossy().as_bytes());
                let hash: String = digest.iter().take(4).map(|b| format!("{:02x}", b)).collect();
                let unique = format!("{}_{}", stem, hash);
                self.claimed.insert(unique.clone(), path.to_path_buf());
                unique
            }
            Some(_) => stem,
            None => {
                self.claimed.insert(stem.clone(), path.to_path_buf());
                stem
            }
        }
    }
}

/// Discover, rewrite and validate a single file.
pub fn discover_file(path: &Path, source: &str, stem: &str, options: &DiscoveryOptions) -> Result<InstrumentedFile> {
    let language = detect_language(path).ok_or_else(|| EngineError::UnsupportedLanguage(path.to_path_buf()))?;
    let tree = dialect::parse(source, language)?.ok_or_else(|| EngineError::Unparsable(path.to_path_buf()))?;
    let root = tree.root_node();
    if root.has_error() {
        return Err(EngineError::Unparsable(path.to_path_buf()));
    }

    let exclusion_set = exclusions::resolve_exclusions(&tree, source, language, path, &options.coverage);
    let cx = FileContext {
        source,
        language,
        exclusions: &exclusion_set,
        exclude_calls: &options.exclude_calls,
    };
    let lines = LineIndex::new(source);

    let per_operator = options.operators.iter().map(|&kind| {
        let mut visitor = visitors::visitor_for(kind);
        let sites = visitors::collect_sites(root, visitor.as_mut(), &cx);
        let mut mapping = SchemataMapping::new();
        for site in sites {
            let position = lines.position(site.anchor);
            let original_text = &source[site.region.start..site.region.end];
            let candidate = CandidateMutation {
                id: MutationId::new(stem, position),
                operator: site.kind,
                file_path: path.to_path_buf(),
                position,
                original_text: original_text.to_string(),
                mutated_text: operators::rewrite(original_text, site.region.start, &site.edit),
                description: site.description,
                snapshot: site.snapshot,
            };
            mapping.insert(site.region, candidate);
        }
        debug!(file = %path.display(), operator = %kind, count = mapping.len(), "collected sites");
        mapping
    });
    let mapping = schemata::merge_by_file(per_operator.collect::<Vec<_>>());

    let mut seen = HashSet::new();
    for candidate in mapping.candidates() {
        if !seen.insert(&candidate.id) {
            return Err(EngineError::DuplicateMutationId {
                id: candidate.id.to_string(),
                path: path.to_path_buf(),
            });
        }
    }

    let instrumented =
        schemata::apply_schemata(source, path, language, &mapping, options.activation_check.as_deref())?;
    schemata::validate(&instrumented, path, language)?;

    Ok(InstrumentedFile {
        path: path.to_path_buf(),
        language,
        original: source.to_string(),
        instrumented,
        mapping,
        zones: exclusion_set.zones().to_vec(),
    })
}

/// Run discovery over in-memory sources. Files that fail to parse or rewrite
/// are skipped with a diagnostic; the run fails only when nothing is found.
pub fn discover_sources(sources: &[(PathBuf, String)], options: &DiscoveryOptions) -> Result<Discovery> {
    let mut ordered: Vec<&(PathBuf, String)> = sources.iter().collect();
    ordered.sort_by(|a, b| a.0.cmp(&b.0));
    ordered.dedup_by(|a, b| a.0 == b.0);

    let mut allocator = IdAllocator::new();
    let mut discovery = Discovery::default();
    for (path, source) in ordered {
        let stem = allocator.stem_for(path);
        match discover_file(path, source, &stem, options) {
            Ok(file) if file.mapping.is_empty() => {
                debug!(file = %path.display(), "no mutation sites");
            }
            Ok(file) => {
                info!(file = %path.display(), mutants = file.mapping.len(), "instrumented");
                discovery.mapping = std::mem::take(&mut discovery.mapping).merge(file.mapping.clone());
                discovery.files.push(file);
            }
            Err(e @ EngineError::Grammar(_)) => return Err(e),
            Err(e) => {
                warn!(file = %path.display(), error = %e, "skipping file");
                discovery.skipped.push(SkippedFile {
                    path: path.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    if discovery.mapping.is_empty() {
        return Err(EngineError::NoMutationsDiscovered);
    }
    Ok(discovery)
}

/// Read `paths` (relative to `root`) and run discovery. Candidates are keyed
/// by the relative path.
pub fn discover(root: &Path, paths: &[PathBuf], options: &DiscoveryOptions) -> Result<Discovery> {
    let mut sources = Vec::with_capacity(paths.len());
    let mut unreadable = Vec::new();
    for rel in paths {
        let full = root.join(rel);
        match std::fs::read_to_string(&full) {
            Ok(text) => sources.push((rel.clone(), text)),
            Err(e) => {
                warn!(file = %full.display(), error = %e, "unreadable source file");
                unreadable.push(SkippedFile {
                    path: rel.clone(),
                    reason: EngineError::io(&full, e).to_string(),
                });
            }
        }
    }
    let mut discovery = discover_sources(&sources, options)?;
    discovery.skipped.extend(unreadable);
    Ok(discovery)
}

/// Write every instrumented file under `root`.
pub fn write_instrumented(root: &Path, discovery: &Discovery) -> Result<()> {
    for file in &discovery.files {
        let dest = root.join(&file.path);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| EngineError::io(parent, e))?;
        }
        std::fs::write(&dest, &file.instrumented).map_err(|e| EngineError::io(&dest, e))?;
    }
    Ok(())
}
