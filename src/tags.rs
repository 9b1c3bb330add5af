//! The DMAP tag registry: a static table mapping 4-byte wire tags to a
//! human name and a [`ValueKind`], plus the `dmap.*`/`daap.*`/`dacp.*`
//! dotted property names remotes use to ask for those tags by meaning.
//!
//! Real DAAP/DMAP implementations carry on the order of 300 tags; this
//! table holds the subset this server's routes and entity properties
//! actually exercise (see SPEC_FULL.md §3). Anything outside that set
//! degrades to [`ValueKind::Binary`] on decode rather than erroring,
//! exactly as spec.md §4.A requires.

use std::collections::HashMap;
use std::sync::OnceLock;

/// A 4-byte ASCII tag identifying a DMAP node, e.g. `mstt` or `minm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(pub [u8; 4]);

impl Tag {
    pub const fn new(s: &str) -> Tag {
        let b = s.as_bytes();
        assert!(b.len() == 4, "tags are exactly 4 bytes");
        Tag([b[0], b[1], b[2], b[3]])
    }

    pub fn as_str(&self) -> &str {
        // Tags in this table are always ASCII; anything read off the wire
        // that isn't valid UTF-8 has no entry in TAG_INFO anyway.
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Debug for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Tag({})", self.as_str())
    }
}

/// The wire shape a tag's value takes. See spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    UByte,
    Byte,
    UShort,
    Short,
    UInt,
    Int,
    ULong,
    Long,
    MultiInt,
    MultiUInt,
    Datetime,
    Version,
    String,
    Binary,
    Container,
}

struct Entry {
    tag: Tag,
    name: &'static str,
    kind: ValueKind,
}

macro_rules! tags {
    ($(($tag:expr, $name:expr, $kind:expr)),* $(,)?) => {
        &[$(Entry { tag: Tag::new($tag), name: $name, kind: $kind }),*]
    };
}

use ValueKind::*;

#[rustfmt::skip]
static ENTRIES: &[Entry] = tags![
    ("msrv", "dmap.serverinforesponse", Container),
    ("mstt", "dmap.status", UInt),
    ("mpro", "dmap.protocolversion", Version),
    ("apro", "daap.protocolversion", Version),
    ("aeSV", "com.apple.itunes.sharing.version", Version),
    ("aeFP", "com.apple.itunes.req-fplay", UByte),
    ("ated", "daap.supportsextradata", UByte),
    ("msed", "dmap.supportsedit", UByte),
    ("msml", "dmap.speakermachinelist", Container),
    ("msma", "dmap.machinespeakerid", ULong),
    ("ceWM", "com.apple.itunes.music-sharing-version", String),
    ("ceVO", "com.apple.itunes.collection-id", UByte),
    ("minm", "dmap.itemname", String),
    ("mslr", "dmap.loginrequired", UByte),
    ("mstm", "dmap.timeoutinterval", UInt),
    ("msal", "dmap.supportsautologout", UByte),
    ("msas", "dmap.authenticationschemes", UByte),
    ("msup", "dmap.supportsupdate", UByte),
    ("mspi", "dmap.supportspersistentids", UByte),
    ("msex", "dmap.supportsextensions", UByte),
    ("msbr", "dmap.supportsbrowse", UByte),
    ("msqy", "dmap.supportsquery", UByte),
    ("msix", "dmap.supportsindex", UByte),
    ("msrs", "dmap.supportsresolve", UByte),
    ("msdc", "dmap.databasescount", UByte),
    ("mstc", "dmap.utctime", Datetime),
    ("msto", "dmap.utcoffset", Int),
    ("mlog", "dmap.loginresponse", Container),
    ("mlid", "dmap.sessionid", UInt),
    ("mupd", "dmap.updateresponse", Container),
    ("musr", "dmap.serverrevision", UInt),
    ("avdb", "daap.serverdatabases", Container),
    ("muty", "dmap.updatetype", UByte),
    ("mtco", "dmap.specifiedtotalcount", UInt),
    ("mrco", "dmap.returnedcount", UInt),
    ("mlcl", "dmap.listing", Container),
    ("mlit", "dmap.listingitem", Container),
    ("miid", "dmap.itemid", UInt),
    ("mper", "dmap.persistentid", ULong),
    ("mimc", "dmap.itemcount", UInt),
    ("mctc", "dmap.containercount", UInt),
    ("meds", "dmap.editcommandssupported", UByte),
    ("mcti", "dmap.containeritemid", UInt),
    ("mpco", "dmap.parentcontainerid", UInt),
    ("mikd", "dmap.itemkind", UByte),
    ("abpl", "daap.baseplaylist", UByte),
    ("apso", "daap.playlistsongs", Container),
    ("aply", "daap.databaseplaylists", Container),
    ("agal", "daap.databasegroups", Container),
    ("abro", "daap.databasebrowse", Container),
    ("abar", "daap.browseartistlisting", Container),
    ("mshl", "dmap.listingsortheaders", Container),
    ("mshc", "dmap.sortheaderchar", UByte),
    ("mshi", "dmap.sortheaderindex", UInt),
    ("mshn", "dmap.sortheadernumber", UInt),
    ("caci", "dacp.controlint", Container),
    ("cmik", "dacp.supportsnumkeys", UByte),
    ("cmsp", "dacp.supportsnowplayingsetters", UByte),
    ("cmsv", "dacp.supportsnowplayingicon", UByte),
    ("cass", "dacp.supportsscan", UByte),
    ("casu", "dacp.supportsshuffle", UByte),
    ("ceSG", "com.apple.itunes.genius-selectable", UByte),
    ("cacr", "dacp.controlresponse", Container),
    ("casp", "dacp.speakers", Container),
    ("mdcl", "dmap.dictionary", Container),
    ("caia", "dacp.isactive", UByte),
    ("cmgt", "dacp.getpropertyresponse", Container),
    ("cmsr", "dacp.serverrevision", UInt),
    ("caps", "dacp.playerstate", UByte),
    ("cash", "dacp.shufflestate", UByte),
    ("carp", "dacp.repeatstate", UByte),
    ("cavc", "dacp.volumecontrollable", UByte),
    ("caas", "dacp.availableshufflestates", UByte),
    ("caar", "dacp.availablerepeatstates", UByte),
    ("canp", "dacp.nowplaying", MultiUInt),
    ("cann", "dacp.nowplayingtrack", String),
    ("cana", "dacp.nowplayingartist", String),
    ("canl", "dacp.nowplayingalbum", String),
    ("cang", "dacp.nowplayinggenre", String),
    ("asai", "daap.songalbumid", UInt),
    ("cmmk", "dacp.mediakind", UByte),
    ("cant", "dacp.remainingtime", Int),
    ("cast", "dacp.totaltime", Int),
    ("medc", "dmap.editcommandresponse", Container),
    ("cmpg", "dacp.pairingguid", ULong),
    ("cmvo", "dmcp.volume", UInt),
    ("asal", "daap.songalbum", String),
    ("asar", "daap.songartist", String),
    ("asri", "daap.songartistid", UInt),
    ("ascp", "daap.songcomposer", String),
    // Year is stored and surfaced as a free-form string in the library
    // model (spec.md §3 `Item.year: string`), unlike most DAAP servers
    // which use a numeric year tag.
    ("asyr", "daap.songyear", String),
    ("asgn", "daap.songgenre", String),
    ("astm", "daap.songtime", UInt),
    ("ascd", "daap.songcontentdescription", String),
    ("aeHV", "com.apple.itunes.has-video", UByte),
];

/// `dotted.property.name -> (tag, kind)`, used by handlers to translate
/// the symbolic property names a remote sends in `meta=`/`properties=`
/// query parameters into wire tags.
pub fn properties() -> &'static HashMap<&'static str, (Tag, ValueKind)> {
    static MAP: OnceLock<HashMap<&'static str, (Tag, ValueKind)>> = OnceLock::new();
    MAP.get_or_init(|| {
        ENTRIES
            .iter()
            .map(|e| (e.name, (e.tag, e.kind)))
            .collect()
    })
}

/// `tag -> (name, kind)`, used by decode (to pick a `Value` constructor)
/// and by pretty-printing.
pub fn tag_info() -> &'static HashMap<Tag, (&'static str, ValueKind)> {
    static MAP: OnceLock<HashMap<Tag, (&'static str, ValueKind)>> = OnceLock::new();
    MAP.get_or_init(|| ENTRIES.iter().map(|e| (e.tag, (e.name, e.kind))).collect())
}

pub fn kind_of(tag: Tag) -> ValueKind {
    tag_info().get(&tag).map(|(_, k)| *k).unwrap_or(Binary)
}

pub fn lookup_property(name: &str) -> Option<(Tag, ValueKind)> {
    properties().get(name).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_round_trips_as_string() {
        assert_eq!(Tag::new("msup").as_str(), "msup");
    }

    #[test]
    fn unknown_tag_degrades_to_binary() {
        assert_eq!(kind_of(Tag::new("zzzz")), ValueKind::Binary);
    }

    #[test]
    fn property_lookup_resolves_known_name() {
        let (tag, kind) = lookup_property("dmap.itemname").unwrap();
        assert_eq!(tag, Tag::new("minm"));
        assert_eq!(kind, ValueKind::String);
    }
}
