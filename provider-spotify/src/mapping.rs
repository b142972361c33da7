//! Wire types to catalog types

use crate::types::{Album, Image, Page, SavedAlbum, SimplifiedArtist};
use chrono::NaiveDate;
use core_library::{RemoteArtist, RemoteImage, RemoteLibraryItem, RemotePage, RemoteRelease};

/// Parse a release date reported with `precision`.
///
/// `year` becomes January 1 and `month` the first of the month. Anything
/// that does not parse is dropped.
pub fn parse_release_date(raw: &str, precision: Option<&str>) -> Option<NaiveDate> {
    let precision = precision.unwrap_or("day").to_ascii_lowercase();
    match precision.as_str() {
        "year" => raw
            .parse::<i32>()
            .ok()
            .and_then(|year| NaiveDate::from_ymd_opt(year, 1, 1)),
        "month" => NaiveDate::parse_from_str(&format!("{}-01", raw), "%Y-%m-%d").ok(),
        "day" => NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok(),
        _ => None,
    }
}

impl From<SimplifiedArtist> for RemoteArtist {
    fn from(artist: SimplifiedArtist) -> Self {
        RemoteArtist {
            external_id: artist.id,
            name: artist.name,
            uri: artist.uri,
            popularity: artist.popularity,
        }
    }
}

impl From<Image> for RemoteImage {
    fn from(image: Image) -> Self {
        RemoteImage {
            url: image.url,
            width: image.width,
            height: image.height,
        }
    }
}

impl From<Album> for RemoteRelease {
    fn from(album: Album) -> Self {
        let release_date = album
            .release_date
            .as_deref()
            .and_then(|raw| parse_release_date(raw, album.release_date_precision.as_deref()));

        RemoteRelease {
            external_id: album.id,
            name: album.name,
            href: album.href,
            uri: album.uri,
            album_type: album.album_type,
            upc: album.external_ids.upc,
            popularity: album.popularity,
            release_date,
            genres: album.genres,
            images: album.images.into_iter().map(RemoteImage::from).collect(),
            artists: album.artists.into_iter().map(RemoteArtist::from).collect(),
        }
    }
}

impl From<SavedAlbum> for RemoteLibraryItem {
    fn from(saved: SavedAlbum) -> Self {
        RemoteLibraryItem {
            release: saved.album.into(),
            added_at: saved.added_at,
        }
    }
}

/// Convert a wire page, mapping each item.
pub fn into_remote_page<T, U: From<T>>(page: Page<T>) -> RemotePage<U> {
    RemotePage {
        has_next: page.next.is_some(),
        offset: page.offset,
        limit: page.limit,
        total: page.total,
        items: page.items.into_iter().map(U::from).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_date_precision() {
        assert_eq!(
            parse_release_date("1958", Some("YEAR")),
            NaiveDate::from_ymd_opt(1958, 1, 1)
        );
        assert_eq!(
            parse_release_date("1971-05", Some("month")),
            NaiveDate::from_ymd_opt(1971, 5, 1)
        );
        assert_eq!(
            parse_release_date("2011-10-03", Some("day")),
            NaiveDate::from_ymd_opt(2011, 10, 3)
        );
        assert_eq!(
            parse_release_date("2011-10-03", None),
            NaiveDate::from_ymd_opt(2011, 10, 3)
        );
    }

    #[test]
    fn test_unparsable_release_dates_dropped() {
        assert_eq!(parse_release_date("19xx", Some("year")), None);
        assert_eq!(parse_release_date("1971-13", Some("month")), None);
        assert_eq!(parse_release_date("1971", Some("day")), None);
        assert_eq!(parse_release_date("1971", Some("decade")), None);
    }

    #[test]
    fn test_album_maps_upc_and_artists() {
        let saved: SavedAlbum = serde_json::from_str(
            r#"{
                "added_at": "2024-02-10T08:30:00Z",
                "album": {
                    "id": "4aawyAB9vmqN3uQ7FjRGTy",
                    "name": "Global Warming",
                    "album_type": "compilation",
                    "external_ids": { "upc": "886443671584" },
                    "artists": [{ "id": "0TnOYISbd1XYRBk9myaseg", "name": "Pitbull" }],
                    "images": [{ "url": "https://i.scdn.co/image/a", "width": 640, "height": 640 }],
                    "release_date": "2012",
                    "release_date_precision": "year"
                }
            }"#,
        )
        .unwrap();

        let item = RemoteLibraryItem::from(saved);
        assert_eq!(item.release.external_id, "4aawyAB9vmqN3uQ7FjRGTy");
        assert_eq!(item.release.upc.as_deref(), Some("886443671584"));
        assert_eq!(item.release.release_date, NaiveDate::from_ymd_opt(2012, 1, 1));
        assert_eq!(item.release.artists[0].name, "Pitbull");
        assert_eq!(item.release.images[0].width, Some(640));
        assert_eq!(item.added_at.to_rfc3339(), "2024-02-10T08:30:00+00:00");
    }
}
