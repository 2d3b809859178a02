//! Track catalog: the scanned song names plus named playlists over them.
//!
//! The track list is fixed once scanned. Playlists are discovered by name up
//! front and their members resolved on first use.

use std::cell::OnceCell;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Index into the catalog's track list.
pub type TrackIndex = usize;

/// Index into the catalog's playlist list.
pub type PlaylistId = usize;

/// Upper bound on the number of tracks taken from one directory.
pub const MAX_TRACKS: usize = 1024;

#[derive(Debug)]
pub struct Playlist {
    pub name: String,
    source: Option<PathBuf>,
    members: OnceCell<Vec<TrackIndex>>,
}

impl Playlist {
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}

#[derive(Debug, Default)]
pub struct Catalog {
    root: PathBuf,
    tracks: Vec<String>,
    lookup: HashMap<String, TrackIndex>,
    playlists: Vec<Playlist>,
}

impl Catalog {
    /// Build a catalog from already-listed names. Later duplicates are dropped.
    pub fn new(root: impl Into<PathBuf>, names: Vec<String>) -> Self {
        let mut tracks = Vec::with_capacity(names.len().min(MAX_TRACKS));
        let mut lookup = HashMap::new();
        for name in names {
            if tracks.len() >= MAX_TRACKS {
                break;
            }
            if lookup.contains_key(&name) {
                continue;
            }
            lookup.insert(name.clone(), tracks.len());
            tracks.push(name);
        }
        Self {
            root: root.into(),
            tracks,
            lookup,
            playlists: Vec::new(),
        }
    }

    /// List the regular, non-hidden files of `dir` in byte order.
    pub fn scan(dir: &Path) -> anyhow::Result<Self> {
        let rd = std::fs::read_dir(dir)
            .map_err(|e| anyhow::anyhow!("cannot read {}: {}", dir.display(), e))?;

        let mut names: Vec<String> = rd
            .filter_map(|entry| {
                let entry = entry.ok()?;
                // file_type() does not follow symlinks, matching a DT_REG check
                if !entry.file_type().ok()?.is_file() {
                    return None;
                }
                let name = match entry.file_name().into_string() {
                    Ok(n) => n,
                    Err(raw) => {
                        debug!("catalog: skipping non-utf8 name {:?}", raw);
                        return None;
                    }
                };
                if name.starts_with('.') {
                    return None;
                }
                Some(name)
            })
            .collect();
        names.sort();

        if names.len() > MAX_TRACKS {
            warn!(
                "catalog: {} files in {}, keeping the first {}",
                names.len(),
                dir.display(),
                MAX_TRACKS
            );
        }
        Ok(Self::new(dir, names))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.tracks
    }

    pub fn name(&self, idx: TrackIndex) -> Option<&str> {
        self.tracks.get(idx).map(String::as_str)
    }

    pub fn position(&self, name: &str) -> Option<TrackIndex> {
        self.lookup.get(name).copied()
    }

    pub fn track_path(&self, idx: TrackIndex) -> Option<PathBuf> {
        self.name(idx).map(|n| self.root.join(n))
    }

    // ── Playlists ─────────────────────────────────────────────────────────────

    /// Register every regular file in `dir` as a playlist named by its stem.
    /// Members are read on first access. A missing directory means none.
    pub fn load_playlists(&mut self, dir: &Path) {
        self.playlists = discover_playlists(dir);
        debug!(
            "catalog: {} playlist(s) in {}",
            self.playlists.len(),
            dir.display()
        );
    }

    /// Drop all cached playlist members and re-discover definitions.
    pub fn reload_playlists(&mut self, dir: &Path) {
        self.load_playlists(dir);
    }

    /// Add a playlist whose members are already known.
    pub fn insert_playlist(&mut self, name: impl Into<String>, members: Vec<TrackIndex>) -> PlaylistId {
        let members = dedup_members(members.into_iter().filter(|&i| i < self.tracks.len()));
        let cell = OnceCell::new();
        let _ = cell.set(members);
        self.playlists.push(Playlist {
            name: name.into(),
            source: None,
            members: cell,
        });
        self.playlists.len() - 1
    }

    pub fn playlists(&self) -> &[Playlist] {
        &self.playlists
    }

    pub fn playlist_count(&self) -> usize {
        self.playlists.len()
    }

    pub fn playlist_name(&self, id: PlaylistId) -> Option<&str> {
        self.playlists.get(id).map(|p| p.name.as_str())
    }

    pub fn playlist_id(&self, name: &str) -> Option<PlaylistId> {
        self.playlists.iter().position(|p| p.name == name)
    }

    /// Members of playlist `id`, reading its definition file on first call.
    pub fn members(&self, id: PlaylistId) -> &[TrackIndex] {
        let Some(playlist) = self.playlists.get(id) else {
            return &[];
        };
        playlist.members.get_or_init(|| match playlist.source.as_deref() {
            Some(path) => self.read_members(&playlist.name, path),
            None => Vec::new(),
        })
    }

    fn read_members(&self, name: &str, path: &Path) -> Vec<TrackIndex> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let members = parse_playlist(&content, |n| self.position(n));
                debug!("catalog: playlist {:?} resolved to {} track(s)", name, members.len());
                members
            }
            Err(e) => {
                warn!("catalog: cannot read playlist {}: {}", path.display(), e);
                Vec::new()
            }
        }
    }
}

/// Resolve a playlist definition: one exact track name per line.
/// Blank lines, `#` comments, unknown names and repeats are skipped.
pub fn parse_playlist(content: &str, resolve: impl Fn(&str) -> Option<TrackIndex>) -> Vec<TrackIndex> {
    dedup_members(
        content
            .lines()
            .map(|l| l.trim_end_matches('\r').trim())
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .filter_map(resolve),
    )
}

fn dedup_members(members: impl Iterator<Item = TrackIndex>) -> Vec<TrackIndex> {
    let mut seen = HashSet::new();
    members.filter(|i| seen.insert(*i)).collect()
}

fn discover_playlists(dir: &Path) -> Vec<Playlist> {
    let Ok(rd) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut found: Vec<(String, PathBuf)> = rd
        .filter_map(|entry| {
            let entry = entry.ok()?;
            let path = entry.path();
            if !path.is_file() {
                return None;
            }
            let stem = path.file_stem()?.to_str()?.to_string();
            if stem.is_empty() || stem.starts_with('.') {
                return None;
            }
            Some((stem, path))
        })
        .collect();
    found.sort();

    found
        .into_iter()
        .map(|(name, path)| Playlist {
            name,
            source: Some(path),
            members: OnceCell::new(),
        })
        .collect()
}
