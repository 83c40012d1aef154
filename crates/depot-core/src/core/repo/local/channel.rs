use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};

use rusqlite::{params, Connection};
use tracing::debug;

use depot_domain::ReleaseChannel;

/// Blobs grow and are written in chunks of at most this many bytes.
const CHUNK: u64 = 1_000_000;

/// Open flags for a blob channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChannelOptions {
    pub read: bool,
    pub write: bool,
    pub append: bool,
    pub create_new: bool,
    pub delete_on_close: bool,
}

impl ChannelOptions {
    #[must_use]
    pub fn read_only() -> Self {
        Self {
            read: true,
            ..Self::default()
        }
    }
}

/// A seekable byte channel over one release's content blob.
///
/// The channel owns the storage connection it was opened with and keeps it
/// until closed. The store addresses blob bytes with 1-based positions
/// (`substr`); the channel's cursor is 0-based and translated at every call.
///
/// Reads return short counts near the end of the blob and report end-of-file
/// at or past it. Writes splice into the blob in place; a cursor beyond the
/// current length first zero-extends the blob. Not thread-safe.
#[derive(Debug)]
pub struct BlobByteChannel {
    conn: Option<Connection>,
    release_id: i64,
    options: ChannelOptions,
    position: u64,
    append_pending: bool,
}

impl BlobByteChannel {
    #[must_use]
    pub fn new(conn: Connection, release_id: i64, options: ChannelOptions) -> Self {
        Self {
            conn: Some(conn),
            release_id,
            options,
            position: 0,
            append_pending: options.append,
        }
    }

    fn content_len(conn: &Connection, release_id: i64) -> io::Result<u64> {
        conn.query_row(
            "SELECT length(content) FROM releases WHERE id = ?1",
            [release_id],
            |row| row.get::<_, i64>(0),
        )
        .map(|len| len.max(0) as u64)
        .map_err(sql_err)
    }
}

fn closed_err() -> io::Error {
    io::Error::other("channel is closed")
}

fn sql_err(err: rusqlite::Error) -> io::Error {
    io::Error::other(err)
}

impl Read for BlobByteChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(conn) = self.conn.as_ref() else {
            return Err(closed_err());
        };
        if !self.options.read {
            return Err(io::Error::new(
                ErrorKind::PermissionDenied,
                "channel is not readable",
            ));
        }
        let length = Self::content_len(conn, self.release_id)?;
        if self.position >= length || buf.is_empty() {
            return Ok(0);
        }
        let data: Vec<u8> = conn
            .query_row(
                "SELECT substr(content, ?1, ?2) FROM releases WHERE id = ?3",
                params![self.position as i64 + 1, buf.len() as i64, self.release_id],
                |row| row.get(0),
            )
            .map_err(sql_err)?;
        let read = data.len().min(buf.len());
        buf[..read].copy_from_slice(&data[..read]);
        self.position += read as u64;
        Ok(read)
    }
}

impl Write for BlobByteChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let Some(conn) = self.conn.as_ref() else {
            return Err(closed_err());
        };
        if !self.options.write {
            return Err(io::Error::new(
                ErrorKind::PermissionDenied,
                "channel is not writable",
            ));
        }
        let mut length = Self::content_len(conn, self.release_id)?;
        if self.append_pending {
            // The first write in append mode relocates the cursor, once.
            self.append_pending = false;
            self.position = length;
        }
        while self.position > length {
            let grow = CHUNK.min(self.position - length);
            conn.execute(
                "UPDATE releases SET content = content || zeroblob(?1) WHERE id = ?2",
                params![grow as i64, self.release_id],
            )
            .map_err(sql_err)?;
            length += grow;
        }
        for chunk in buf.chunks(CHUNK as usize) {
            let prefix = self.position as i64;
            conn.execute(
                "UPDATE releases SET content = \
                 substr(content, 1, ?1) || ?2 || substr(content, ?3) WHERE id = ?4",
                params![prefix, chunk, prefix + chunk.len() as i64 + 1, self.release_id],
            )
            .map_err(sql_err)?;
            self.position += chunk.len() as u64;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.conn.is_none() {
            return Err(closed_err());
        }
        Ok(())
    }
}

impl Seek for BlobByteChannel {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let Some(conn) = self.conn.as_ref() else {
            return Err(closed_err());
        };
        let target: i128 = match pos {
            SeekFrom::Start(offset) => i128::from(offset),
            SeekFrom::End(delta) => {
                i128::from(Self::content_len(conn, self.release_id)?) + i128::from(delta)
            }
            SeekFrom::Current(delta) => i128::from(self.position) + i128::from(delta),
        };
        if target < 0 {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                "cannot seek before the start of the blob",
            ));
        }
        self.position = target as u64;
        Ok(self.position)
    }
}

impl ReleaseChannel for BlobByteChannel {
    fn len(&self) -> io::Result<u64> {
        let Some(conn) = self.conn.as_ref() else {
            return Err(closed_err());
        };
        Self::content_len(conn, self.release_id)
    }

    fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    fn close(&mut self) -> io::Result<()> {
        if let Some(conn) = self.conn.take() {
            // Some backends refuse to release a busy handle; the session is
            // finished either way.
            if let Err((_conn, err)) = conn.close() {
                debug!(release_id = self.release_id, error = %err, "closing the blob channel session failed");
            }
        }
        Ok(())
    }
}

impl Drop for BlobByteChannel {
    fn drop(&mut self) {
        let _ = ReleaseChannel::close(self);
    }
}
