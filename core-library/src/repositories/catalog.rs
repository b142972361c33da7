//! Shared release/artist catalog
//!
//! Remote releases are mirrored once per external id and shared by every
//! user's library. Inserts race safely: the external-id unique constraint
//! decides the winner and every caller re-reads the surviving row.

use crate::error::{LibraryError, Result};
use crate::models::{parse_id, Artist, ArtistId, Release, ReleaseId};
use crate::remote::{RemoteArtist, RemoteRelease};
use async_trait::async_trait;
use bridge_traits::time::Clock;
use chrono::NaiveDate;
use sqlx::{query, query_as, query_scalar, FromRow, SqliteConnection, SqlitePool};
use std::sync::Arc;
use tracing::debug;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[async_trait]
pub trait CatalogService: Send + Sync {
    /// Id of the catalog release for `release`, creating it with its artists,
    /// images and genres on first sight.
    async fn find_or_create_release(&self, release: &RemoteRelease) -> Result<ReleaseId>;

    async fn find_release(&self, external_id: &str) -> Result<Option<Release>>;

    /// Artists credited on a release, in credit order.
    async fn release_artists(&self, release_id: ReleaseId) -> Result<Vec<Artist>>;
}

pub struct SqliteCatalogService {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteCatalogService {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

/// Catalog id for `release`, inserting it with its details on first sight.
///
/// Runs on the caller's connection so the write joins any open transaction.
pub(crate) async fn upsert_release(
    conn: &mut SqliteConnection,
    release: &RemoteRelease,
    now: i64,
) -> Result<ReleaseId> {
    if release.external_id.is_empty() {
        return Err(LibraryError::InvalidInput {
            field: "external_id".to_string(),
            message: "release has no external id".to_string(),
        });
    }

    let inserted = query(
        r#"
        INSERT INTO releases (
            id, external_id, upc, href, name, album_type, popularity, release_date, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(external_id) DO NOTHING
        "#,
    )
    .bind(ReleaseId::new().to_string())
    .bind(&release.external_id)
    .bind(&release.upc)
    .bind(&release.href)
    .bind(&release.name)
    .bind(&release.album_type)
    .bind(release.popularity)
    .bind(release.release_date.map(|d| d.format(DATE_FORMAT).to_string()))
    .bind(now)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    let id: String = query_scalar("SELECT id FROM releases WHERE external_id = ?")
        .bind(&release.external_id)
        .fetch_one(&mut *conn)
        .await?;

    if inserted == 1 {
        attach_details(conn, &id, release, now).await?;
        debug!(external_id = %release.external_id, release_id = %id, "Catalogued release");
    }

    parse_id("release id", &id, ReleaseId::from_string)
}

async fn upsert_artist(conn: &mut SqliteConnection, artist: &RemoteArtist, now: i64) -> Result<String> {
    query(
        r#"
        INSERT INTO artists (id, external_id, external_uri, name, popularity, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(external_id) DO UPDATE SET
            name = excluded.name,
            external_uri = COALESCE(excluded.external_uri, artists.external_uri),
            popularity = COALESCE(excluded.popularity, artists.popularity)
        "#,
    )
    .bind(ArtistId::new().to_string())
    .bind(&artist.external_id)
    .bind(&artist.uri)
    .bind(&artist.name)
    .bind(artist.popularity)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    let id: String = query_scalar("SELECT id FROM artists WHERE external_id = ?")
        .bind(&artist.external_id)
        .fetch_one(&mut *conn)
        .await?;

    Ok(id)
}

async fn attach_details(
    conn: &mut SqliteConnection,
    release_id: &str,
    release: &RemoteRelease,
    now: i64,
) -> Result<()> {
    for (position, artist) in release.artists.iter().enumerate() {
        let artist_id = upsert_artist(conn, artist, now).await?;
        query(
            "INSERT OR IGNORE INTO release_artists (release_id, artist_id, position) VALUES (?, ?, ?)",
        )
        .bind(release_id)
        .bind(artist_id)
        .bind(position as i64)
        .execute(&mut *conn)
        .await?;
    }

    for (position, image) in release.images.iter().enumerate() {
        query(
            "INSERT OR IGNORE INTO release_images (release_id, url, width, height, position) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(release_id)
        .bind(&image.url)
        .bind(image.width.map(i64::from))
        .bind(image.height.map(i64::from))
        .bind(position as i64)
        .execute(&mut *conn)
        .await?;
    }

    for genre in &release.genres {
        query("INSERT OR IGNORE INTO release_genres (release_id, genre) VALUES (?, ?)")
            .bind(release_id)
            .bind(genre)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

#[derive(Debug, FromRow)]
struct ReleaseRow {
    id: String,
    external_id: String,
    upc: Option<String>,
    href: Option<String>,
    name: String,
    album_type: Option<String>,
    popularity: Option<i32>,
    release_date: Option<String>,
    created_at: i64,
}

impl TryFrom<ReleaseRow> for Release {
    type Error = LibraryError;

    fn try_from(row: ReleaseRow) -> Result<Self> {
        let release_date = row
            .release_date
            .as_deref()
            .map(|raw| {
                NaiveDate::parse_from_str(raw, DATE_FORMAT)
                    .map_err(|e| LibraryError::InvalidState(format!("release_date '{}': {}", raw, e)))
            })
            .transpose()?;

        Ok(Release {
            id: parse_id("release id", &row.id, ReleaseId::from_string)?,
            external_id: row.external_id,
            upc: row.upc,
            href: row.href,
            name: row.name,
            album_type: row.album_type,
            popularity: row.popularity,
            release_date,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ArtistRow {
    id: String,
    external_id: String,
    external_uri: Option<String>,
    name: String,
    popularity: Option<i32>,
    created_at: i64,
}

impl TryFrom<ArtistRow> for Artist {
    type Error = LibraryError;

    fn try_from(row: ArtistRow) -> Result<Self> {
        Ok(Artist {
            id: parse_id("artist id", &row.id, ArtistId::from_string)?,
            external_id: row.external_id,
            external_uri: row.external_uri,
            name: row.name,
            popularity: row.popularity,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl CatalogService for SqliteCatalogService {
    async fn find_or_create_release(&self, release: &RemoteRelease) -> Result<ReleaseId> {
        let now = self.clock.unix_timestamp_millis();
        let mut tx = self.pool.begin().await?;
        let id = upsert_release(&mut *tx, release, now).await?;
        tx.commit().await?;
        Ok(id)
    }

    async fn find_release(&self, external_id: &str) -> Result<Option<Release>> {
        let row = query_as::<_, ReleaseRow>(
            r#"
            SELECT id, external_id, upc, href, name, album_type, popularity, release_date, created_at
            FROM releases
            WHERE external_id = ?
            "#,
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Release::try_from).transpose()
    }

    async fn release_artists(&self, release_id: ReleaseId) -> Result<Vec<Artist>> {
        let rows = query_as::<_, ArtistRow>(
            r#"
            SELECT a.id, a.external_id, a.external_uri, a.name, a.popularity, a.created_at
            FROM artists a
            JOIN release_artists ra ON ra.artist_id = a.id
            WHERE ra.release_id = ?
            ORDER BY ra.position ASC
            "#,
        )
        .bind(release_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Artist::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::remote::RemoteImage;
    use bridge_traits::time::SystemClock;

    fn remote_release(external_id: &str) -> RemoteRelease {
        RemoteRelease {
            external_id: external_id.to_string(),
            name: "Blue Train".to_string(),
            href: Some(format!("https://api.example.com/albums/{}", external_id)),
            uri: Some(format!("spotify:album:{}", external_id)),
            album_type: Some("album".to_string()),
            upc: Some("602537151245".to_string()),
            popularity: Some(61),
            release_date: NaiveDate::from_ymd_opt(1958, 1, 1),
            genres: vec!["hard bop".to_string(), "jazz".to_string()],
            images: vec![RemoteImage {
                url: "https://i.example.com/640".to_string(),
                width: Some(640),
                height: Some(640),
            }],
            artists: vec![
                RemoteArtist {
                    external_id: "coltrane".to_string(),
                    name: "John Coltrane".to_string(),
                    uri: Some("spotify:artist:coltrane".to_string()),
                    popularity: None,
                },
                RemoteArtist {
                    external_id: "morgan".to_string(),
                    name: "Lee Morgan".to_string(),
                    uri: None,
                    popularity: Some(50),
                },
            ],
        }
    }

    async fn service() -> SqliteCatalogService {
        let pool = create_test_pool().await.unwrap();
        SqliteCatalogService::new(pool, Arc::new(SystemClock))
    }

    #[tokio::test]
    async fn test_find_or_create_release_is_idempotent() {
        let catalog = service().await;
        let release = remote_release("album-1");

        let first = catalog.find_or_create_release(&release).await.unwrap();
        let second = catalog.find_or_create_release(&release).await.unwrap();
        assert_eq!(first, second);

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM releases")
            .fetch_one(&catalog.pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_release_details_are_stored() {
        let catalog = service().await;
        let id = catalog
            .find_or_create_release(&remote_release("album-2"))
            .await
            .unwrap();

        let stored = catalog.find_release("album-2").await.unwrap().unwrap();
        assert_eq!(stored.id, id);
        assert_eq!(stored.upc.as_deref(), Some("602537151245"));
        assert_eq!(stored.release_date, NaiveDate::from_ymd_opt(1958, 1, 1));

        let artists = catalog.release_artists(id).await.unwrap();
        let names: Vec<_> = artists.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["John Coltrane", "Lee Morgan"]);
    }

    #[tokio::test]
    async fn test_artists_shared_between_releases() {
        let catalog = service().await;
        let a = catalog
            .find_or_create_release(&remote_release("album-a"))
            .await
            .unwrap();
        let b = catalog
            .find_or_create_release(&remote_release("album-b"))
            .await
            .unwrap();

        let (artists,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM artists")
            .fetch_one(&catalog.pool)
            .await
            .unwrap();
        assert_eq!(artists, 2);
        assert_eq!(
            catalog.release_artists(a).await.unwrap()[0].id,
            catalog.release_artists(b).await.unwrap()[0].id
        );
    }

    #[tokio::test]
    async fn test_missing_external_id_rejected() {
        let catalog = service().await;
        let result = catalog.find_or_create_release(&remote_release("")).await;
        assert!(matches!(result, Err(LibraryError::InvalidInput { .. })));
    }
}
