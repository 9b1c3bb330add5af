//! The artwork cache (spec.md §4.G): normalize an (artist, album) pair to
//! a fingerprint, look it up in the persistent cache, and on a miss walk
//! a provider waterfall (last.fm, then albumart.org), resizing whatever
//! comes back and negative-caching outright misses.
//!
//! Grounded on `euphony/albumart.py`'s `AlbumArt` class (provider order,
//! `clean_name` normalization, negative-cache record) and `euphony/db.py`
//! (`AlbumArtRecord`'s sqlite-backed persistence), adapted to `rusqlite`
//! + `reqwest` + `image`.

use image::GenericImageView;
use rusqlite::{Connection, OptionalExt, params};

#[derive(Debug, thiserror::Error)]
pub enum ArtworkError {
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("no provider returned artwork for this fingerprint")]
    NotFound,
}

/// Strip everything but ASCII alphanumerics and lowercase what remains,
/// exactly matching `util.clean_name`'s normalization so two spellings of
/// the same album (`"Kid A"` vs `"kid-a"`) land on one cache entry.
pub fn normalize(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_alphanumeric()).map(|c| c.to_ascii_lowercase()).collect()
}

pub fn fingerprint(artist: &str, album: &str) -> String {
    format!("{}/{}", normalize(artist), normalize(album))
}

pub struct ArtworkCache {
    db: Connection,
    http: reqwest::Client,
}

impl ArtworkCache {
    pub fn open(db: Connection) -> Result<ArtworkCache, ArtworkError> {
        db.execute_batch(
            "CREATE TABLE IF NOT EXISTS artwork (
                fingerprint TEXT PRIMARY KEY,
                png_bytes   BLOB,
                is_negative INTEGER NOT NULL
            )",
        )?;
        Ok(ArtworkCache { db, http: reqwest::Client::new() })
    }

    /// Look up cached artwork for `(artist, album)`, fetching and
    /// resizing to `width x height` on a cold miss. A previously recorded
    /// negative result short-circuits straight to [`ArtworkError::NotFound`]
    /// without hitting the network again.
    pub async fn get(
        &self,
        artist: &str,
        album: &str,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, ArtworkError> {
        let fp = fingerprint(artist, album);
        if let Some(row) = self.lookup(&fp)? {
            return match row {
                Some(bytes) => Ok(resize_png(&bytes, width, height)),
                None => Err(ArtworkError::NotFound),
            };
        }

        match self.fetch_from_providers(artist, album, width, height).await {
            Some(bytes) => {
                self.store(&fp, Some(&bytes))?;
                Ok(resize_png(&bytes, width, height))
            }
            None => {
                self.store(&fp, None)?;
                Err(ArtworkError::NotFound)
            }
        }
    }

    /// `Ok(None)` = not in the cache at all; `Ok(Some(None))` = cached
    /// negative result; `Ok(Some(Some(bytes)))` = cached artwork.
    fn lookup(&self, fingerprint: &str) -> Result<Option<Option<Vec<u8>>>, ArtworkError> {
        let row: Option<(Option<Vec<u8>>, i64)> = self
            .db
            .query_row(
                "SELECT png_bytes, is_negative FROM artwork WHERE fingerprint = ?1",
                params![fingerprint],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        Ok(row.map(|(bytes, negative)| if negative != 0 { None } else { bytes }))
    }

    fn store(&self, fingerprint: &str, bytes: Option<&[u8]>) -> Result<(), ArtworkError> {
        self.db.execute(
            "INSERT OR REPLACE INTO artwork (fingerprint, png_bytes, is_negative) VALUES (?1, ?2, ?3)",
            params![fingerprint, bytes, bytes.is_none() as i64],
        )?;
        Ok(())
    }

    /// Walk the provider waterfall; the first image whose longest side
    /// reaches `min(width, height)` wins outright, otherwise the largest
    /// image seen across all providers is kept and returned.
    async fn fetch_from_providers(&self, artist: &str, album: &str, width: u32, height: u32) -> Option<Vec<u8>> {
        let threshold = width.min(height);
        let mut best: Option<(u32, Vec<u8>)> = None;

        for bytes in
            [self.fetch_lastfm(artist, album).await, self.fetch_albumart_org(artist, album).await].into_iter().flatten()
        {
            let Ok(img) = image::load_from_memory(&bytes) else { continue };
            let (w, h) = img.dimensions();
            let longest = w.max(h);
            if longest >= threshold {
                return Some(bytes);
            }
            if best.as_ref().is_none_or(|(best_longest, _)| longest > *best_longest) {
                best = Some((longest, bytes));
            }
        }

        best.map(|(_, bytes)| bytes)
    }

    async fn fetch_lastfm(&self, artist: &str, album: &str) -> Option<Vec<u8>> {
        let url = format!(
            "https://ws.audioscrobbler.com/2.0/?method=album.getinfo&artist={}&album={}&format=json",
            percent_encode(artist),
            percent_encode(album)
        );
        let json: serde_json::Value = self.http.get(&url).send().await.ok()?.json().await.ok()?;
        let image_url = json
            .pointer("/album/image")?
            .as_array()?
            .last()?
            .get("#text")?
            .as_str()?
            .to_string();
        if image_url.is_empty() {
            return None;
        }
        self.http.get(&image_url).send().await.ok()?.bytes().await.ok().map(|b| b.to_vec())
    }

    async fn fetch_albumart_org(&self, artist: &str, album: &str) -> Option<Vec<u8>> {
        let url = format!(
            "https://www.albumart.org/index_detail.php?artist={}&album={}",
            percent_encode(artist),
            percent_encode(album)
        );
        self.http.get(&url).send().await.ok()?.bytes().await.ok().map(|b| b.to_vec())
    }
}

fn percent_encode(s: &str) -> String {
    percent_encoding::utf8_percent_encode(s, percent_encoding::NON_ALPHANUMERIC).to_string()
}

fn resize_png(bytes: &[u8], width: u32, height: u32) -> Vec<u8> {
    let Ok(img) = image::load_from_memory(bytes) else {
        return bytes.to_vec();
    };
    let resized = img.resize_exact(width, height, image::imageops::FilterType::Lanczos3);
    let mut out = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut out);
    if resized.write_to(&mut cursor, image::ImageFormat::Png).is_err() {
        return bytes.to_vec();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_punctuation_and_lowercases() {
        assert_eq!(normalize("Kid A"), "kida");
        assert_eq!(normalize("kid-a!"), "kida");
    }

    #[test]
    fn fingerprint_is_stable_across_equivalent_spellings() {
        assert_eq!(fingerprint("Boards of Canada", "Geogaddi"), fingerprint("boards-of-canada", "GEOGADDI"));
    }

    #[test]
    fn cache_round_trips_a_negative_result() {
        let db = Connection::open_in_memory().unwrap();
        let cache = ArtworkCache::open(db).unwrap();
        let fp = fingerprint("Nobody", "Nothing");
        cache.store(&fp, None).unwrap();
        assert_eq!(cache.lookup(&fp).unwrap(), Some(None));
    }
}
