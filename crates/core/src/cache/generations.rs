//! `CacheStorage` implementation on top of SQLite.

use async_trait::async_trait;
use tokio_rusqlite::{params, rusqlite};

use super::connection::CacheDb;
use super::hash::{compute_request_key, normalize_url};
use super::store::{CacheStorage, GenerationInfo, is_cacheable};
use crate::{Error, Request, Response};

/// Row shape written by `put_all`.
struct EntryRow {
    key: String,
    method: String,
    url: String,
    status: u16,
    headers_json: String,
    body: Vec<u8>,
}

impl EntryRow {
    fn from_pair(request: &Request, response: &Response) -> Result<Self, Error> {
        if !is_cacheable(request) {
            return Err(Error::InvalidInput(format!("cannot cache {} {}", request.method, request.url)));
        }
        Ok(Self {
            key: compute_request_key(&request.method, &request.url),
            method: request.method.to_ascii_uppercase(),
            url: normalize_url(&request.url),
            status: response.status,
            headers_json: serde_json::to_string(&response.headers)?,
            body: response.body.clone(),
        })
    }
}

fn decode_response(status: u16, headers_json: &str, body: Vec<u8>) -> Result<Response, Error> {
    let headers: Vec<(String, String)> = serde_json::from_str(headers_json)?;
    Ok(Response { status, headers, body })
}

impl CacheDb {
    async fn find(&self, generation: Option<String>, key: String) -> Result<Option<Response>, Error> {
        self.conn
            .call(move |conn| -> Result<Option<Response>, Error> {
                let row = match &generation {
                    Some(name) => conn.query_row(
                        "SELECT status, headers_json, body FROM entries WHERE generation = ?1 AND key = ?2",
                        params![name, key],
                        |row| Ok((row.get::<_, u16>(0)?, row.get::<_, String>(1)?, row.get::<_, Vec<u8>>(2)?)),
                    ),
                    None => conn.query_row(
                        "SELECT e.status, e.headers_json, e.body
                         FROM entries e JOIN generations g ON g.name = e.generation
                         WHERE e.key = ?1
                         ORDER BY g.rowid ASC LIMIT 1",
                        params![key],
                        |row| Ok((row.get::<_, u16>(0)?, row.get::<_, String>(1)?, row.get::<_, Vec<u8>>(2)?)),
                    ),
                };

                match row {
                    Ok((status, headers_json, body)) => Ok(Some(decode_response(status, &headers_json, body)?)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }
}

#[async_trait]
impl CacheStorage for CacheDb {
    async fn open(&self, name: &str) -> Result<(), Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT OR IGNORE INTO generations (name, created_at) VALUES (?1, ?2)",
                    params![name, chrono::Utc::now().to_rfc3339()],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn put_all(&self, name: &str, entries: Vec<(Request, Response)>) -> Result<(), Error> {
        let rows = entries
            .iter()
            .map(|(request, response)| EntryRow::from_pair(request, response))
            .collect::<Result<Vec<_>, _>>()?;
        let name = name.to_string();

        self.conn
            .call(move |conn| -> Result<(), Error> {
                let now = chrono::Utc::now().to_rfc3339();
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT OR IGNORE INTO generations (name, created_at) VALUES (?1, ?2)",
                    params![name, now],
                )?;
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO entries (generation, key, method, url, status, headers_json, body, stored_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                         ON CONFLICT(generation, key) DO UPDATE SET
                            method = excluded.method,
                            url = excluded.url,
                            status = excluded.status,
                            headers_json = excluded.headers_json,
                            body = excluded.body,
                            stored_at = excluded.stored_at",
                    )?;
                    for row in &rows {
                        stmt.execute(params![
                            name,
                            row.key,
                            row.method,
                            row.url,
                            row.status,
                            row.headers_json,
                            row.body,
                            now,
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn match_in(&self, name: &str, request: &Request) -> Result<Option<Response>, Error> {
        if !is_cacheable(request) {
            return Ok(None);
        }
        let key = compute_request_key(&request.method, &request.url);
        self.find(Some(name.to_string()), key).await
    }

    async fn match_any(&self, request: &Request) -> Result<Option<Response>, Error> {
        if !is_cacheable(request) {
            return Ok(None);
        }
        let key = compute_request_key(&request.method, &request.url);
        self.find(None, key).await
    }

    async fn keys(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM generations ORDER BY rowid ASC")?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    async fn delete(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM generations WHERE name = ?1", params![name])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    async fn generations(&self) -> Result<Vec<GenerationInfo>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<GenerationInfo>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT g.name, g.created_at, COUNT(e.key)
                     FROM generations g LEFT JOIN entries e ON e.generation = g.name
                     GROUP BY g.name
                     ORDER BY g.rowid ASC",
                )?;
                let infos = stmt
                    .query_map([], |row| {
                        Ok(GenerationInfo {
                            name: row.get(0)?,
                            created_at: row.get(1)?,
                            entries: row.get::<_, i64>(2)? as u64,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(infos)
            })
            .await
            .map_err(Error::from)
    }

    async fn entry_urls(&self, name: &str) -> Result<Vec<String>, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT url FROM entries WHERE generation = ?1 ORDER BY url ASC")?;
                let urls = stmt
                    .query_map(params![name], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(urls)
            })
            .await
            .map_err(Error::from)
    }
}
