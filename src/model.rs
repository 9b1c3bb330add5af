//! The library model: the `Artist`/`Album`/`Item`/`Container` entities a
//! DACP client actually asks about, and [`IndexedCollection`], the
//! insertion-ordered + property-indexed container spec.md §4.D demands.
//!
//! `euphony/mpdplayer.py` builds these same four entities and registers
//! their properties through a metaclass. spec.md §9 asks for that to be
//! redesigned as a plain trait instead; [`LibraryProperties`] is that
//! trait, and each entity implements it by hand rather than through
//! registration magic.

use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl PropertyValue {
    fn as_comparable_string(&self) -> String {
        match self {
            PropertyValue::Str(s) => s.clone(),
            PropertyValue::Int(n) => n.to_string(),
            PropertyValue::Bool(b) => if *b { "1".into() } else { "0".into() },
        }
    }
}

/// Implemented by every library entity. Replaces the source's metaclass
/// property registration (`mpdplayer.py`) with an explicit method each
/// type provides itself.
pub trait LibraryProperties {
    fn persistent_id(&self) -> u64;

    /// All `dmap.*`/`daap.*` dotted properties this entity answers to,
    /// paired with their current value. Used both to build the property
    /// index on insert and to answer `meta=`/`properties=` requests.
    fn properties(&self) -> Vec<(&'static str, PropertyValue)>;

    fn get_property(&self, name: &str) -> Option<PropertyValue> {
        self.properties().into_iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }
}

#[derive(Debug, Clone)]
pub struct Artist {
    pub id: u32,
    pub name: String,
}

impl LibraryProperties for Artist {
    fn persistent_id(&self) -> u64 {
        self.id as u64
    }

    fn properties(&self) -> Vec<(&'static str, PropertyValue)> {
        vec![
            ("dmap.itemid", PropertyValue::Int(self.id as i64)),
            ("dmap.itemname", PropertyValue::Str(self.name.clone())),
            ("daap.songartist", PropertyValue::Str(self.name.clone())),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct Album {
    pub id: u32,
    pub name: String,
    pub artist_name: String,
    pub artist_id: u32,
}

impl LibraryProperties for Album {
    fn persistent_id(&self) -> u64 {
        self.id as u64
    }

    fn properties(&self) -> Vec<(&'static str, PropertyValue)> {
        vec![
            ("dmap.itemid", PropertyValue::Int(self.id as i64)),
            ("dmap.itemname", PropertyValue::Str(self.name.clone())),
            ("daap.songalbum", PropertyValue::Str(self.name.clone())),
            ("daap.songalbumid", PropertyValue::Int(self.id as i64)),
            ("daap.songartist", PropertyValue::Str(self.artist_name.clone())),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct Item {
    pub id: u32,
    pub name: String,
    pub artist: String,
    pub artist_id: u32,
    pub album: String,
    pub album_id: u32,
    pub track: u16,
    pub composer: String,
    pub genre: String,
    pub year: String,
    /// Track duration in milliseconds.
    pub time_ms: u32,
    /// Playable path relative to the MPD music root; also the unique key
    /// used to map a queue position back to a library item.
    pub path: String,
}

impl LibraryProperties for Item {
    fn persistent_id(&self) -> u64 {
        self.id as u64
    }

    fn properties(&self) -> Vec<(&'static str, PropertyValue)> {
        vec![
            ("dmap.itemid", PropertyValue::Int(self.id as i64)),
            ("dmap.itemname", PropertyValue::Str(self.name.clone())),
            ("daap.songalbum", PropertyValue::Str(self.album.clone())),
            ("daap.songalbumid", PropertyValue::Int(self.album_id as i64)),
            ("daap.songartist", PropertyValue::Str(self.artist.clone())),
            ("daap.songartistid", PropertyValue::Int(self.artist_id as i64)),
            ("daap.songcomposer", PropertyValue::Str(self.composer.clone())),
            ("daap.songyear", PropertyValue::Str(self.year.clone())),
            ("daap.songgenre", PropertyValue::Str(self.genre.clone())),
            ("daap.songtime", PropertyValue::Int(self.time_ms as i64)),
            ("daap.songcontentdescription", PropertyValue::Str(String::new())),
            ("com.apple.itunes.has-video", PropertyValue::Bool(false)),
            ("dmap.itemkind", PropertyValue::Int(2)),
        ]
    }
}

/// A playlist or other browsable grouping -- MPD's `listplaylists`
/// output, plus the synthetic "base playlist" (the whole library).
#[derive(Debug, Clone)]
pub struct Container {
    pub id: u32,
    pub name: String,
    pub is_base: bool,
    pub item_count: usize,
    pub item_ids: Vec<u32>,
}

impl LibraryProperties for Container {
    fn persistent_id(&self) -> u64 {
        self.id as u64
    }

    fn properties(&self) -> Vec<(&'static str, PropertyValue)> {
        vec![
            ("dmap.itemid", PropertyValue::Int(self.id as i64)),
            ("dmap.itemname", PropertyValue::Str(self.name.clone())),
            ("dmap.itemcount", PropertyValue::Int(self.item_count as i64)),
            ("daap.baseplaylist", PropertyValue::Bool(self.is_base)),
            ("dmap.parentcontainerid", PropertyValue::Int(0)),
            ("dmap.editcommandssupported", PropertyValue::Int(if self.is_base { 0 } else { 3 })),
        ]
    }
}

/// Insertion-ordered collection of `T` with a secondary
/// `property -> value -> positions` index built as elements are
/// inserted, per spec.md §4.D.
pub struct IndexedCollection<T: LibraryProperties> {
    items: Vec<T>,
    index: HashMap<&'static str, HashMap<String, BTreeSet<usize>>>,
}

impl<T: LibraryProperties> Default for IndexedCollection<T> {
    fn default() -> Self {
        IndexedCollection { items: Vec::new(), index: HashMap::new() }
    }
}

impl<T: LibraryProperties> IndexedCollection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: T) -> usize {
        let pos = self.items.len();
        for (name, value) in item.properties() {
            self.index
                .entry(name)
                .or_default()
                .entry(value.as_comparable_string())
                .or_default()
                .insert(pos);
        }
        self.items.push(item);
        pos
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, pos: usize) -> Option<&T> {
        self.items.get(pos)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn find_by_id(&self, id: u64) -> Option<(usize, &T)> {
        self.items.iter().enumerate().find(|(_, t)| t.persistent_id() == id)
    }

    /// Positions whose `property` equals `value`, honoring a trailing or
    /// leading `*` as a glob wildcard the way `query.py` does.
    pub fn matching(&self, property: &str, value: &str) -> BTreeSet<usize> {
        let Some(by_value) = self.index.get(property) else {
            return BTreeSet::new();
        };
        if value.contains('*') {
            let mut out = BTreeSet::new();
            for (candidate, positions) in by_value {
                if wildcard_match(value, candidate) {
                    out.extend(positions);
                }
            }
            out
        } else {
            by_value.get(value).cloned().unwrap_or_default()
        }
    }
}

fn wildcard_match(pattern: &str, candidate: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(middle) = pattern.strip_prefix('*').and_then(|p| p.strip_suffix('*')) {
        if !middle.contains('*') {
            return candidate.contains(middle);
        }
    }
    match (pattern.strip_prefix('*'), pattern.strip_suffix('*')) {
        (Some(suffix), _) if !suffix.contains('*') => candidate.ends_with(suffix),
        (_, Some(prefix)) if !prefix.contains('*') => candidate.starts_with(prefix),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> IndexedCollection<Artist> {
        let mut c = IndexedCollection::new();
        c.push(Artist { id: 1, name: "Radiohead".into() });
        c.push(Artist { id: 2, name: "Boards of Canada".into() });
        c
    }

    #[test]
    fn exact_match_finds_position() {
        let c = sample();
        assert_eq!(c.matching("daap.songartist", "Radiohead"), BTreeSet::from([0]));
    }

    #[test]
    fn miss_is_empty_not_an_error() {
        let c = sample();
        assert_eq!(c.matching("daap.songartist", "Portishead"), BTreeSet::new());
    }

    #[test]
    fn wildcard_prefix_matches() {
        let c = sample();
        assert_eq!(c.matching("daap.songartist", "Radio*"), BTreeSet::from([0]));
    }

    #[test]
    fn wildcard_on_both_ends_matches_substring() {
        let c = sample();
        assert_eq!(c.matching("daap.songartist", "*oard*"), BTreeSet::from([1]));
    }

    #[test]
    fn find_by_id_locates_position() {
        let c = sample();
        let (pos, artist) = c.find_by_id(2).unwrap();
        assert_eq!(pos, 1);
        assert_eq!(artist.name, "Boards of Canada");
    }
}
