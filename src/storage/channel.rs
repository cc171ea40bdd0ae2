use std::io::{Cursor, Read, Seek, SeekFrom, Write};

/// Random-access byte store a database lives in: a file, an in-memory buffer,
/// or anything else that can read, write and seek.
pub trait ByteChannel: Read + Write + Seek {
    /// Pushes written bytes to durable storage. Memory channels have nothing to do.
    fn sync(&mut self) -> std::io::Result<()> {
        self.flush()
    }

    fn len(&mut self) -> std::io::Result<u64> {
        let current = self.stream_position()?;
        let end = self.seek(SeekFrom::End(0))?;
        if current != end {
            self.seek(SeekFrom::Start(current))?;
        }
        Ok(end)
    }
}

impl ByteChannel for std::fs::File {
    fn sync(&mut self) -> std::io::Result<()> {
        self.flush()?;
        self.sync_data()
    }

    fn len(&mut self) -> std::io::Result<u64> {
        Ok(self.metadata()?.len())
    }
}

impl ByteChannel for Cursor<Vec<u8>> {
    fn len(&mut self) -> std::io::Result<u64> {
        Ok(self.get_ref().len() as u64)
    }
}

impl<T: ByteChannel + ?Sized> ByteChannel for Box<T> {
    fn sync(&mut self) -> std::io::Result<()> {
        (**self).sync()
    }

    fn len(&mut self) -> std::io::Result<u64> {
        (**self).len()
    }
}

/// Reads the whole channel, e.g. to snapshot an in-memory database.
pub fn read_all(channel: &mut dyn ByteChannel) -> std::io::Result<Vec<u8>> {
    let mut bytes = Vec::new();
    channel.seek(SeekFrom::Start(0))?;
    channel.read_to_end(&mut bytes)?;
    Ok(bytes)
}
