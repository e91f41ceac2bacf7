use std::io::Write;

use crate::error::Result;

/// The append-only sink a table is built into. Every operation may fail with an I/O
/// error; the builder propagates such failures to its caller.
pub trait WritableFile {
    fn append(&mut self, data: &[u8]) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
    fn sync(&mut self) -> Result<()>;
    fn close(&mut self) -> Result<()>;
}

/// Any `Write` sink is a `WritableFile`; `sync` and `close` degrade to `flush`, since
/// durability of real files is the concern of the environment owning them.
impl<W: Write> WritableFile for W {
    fn append(&mut self, data: &[u8]) -> Result<()> {
        self.write_all(data)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Write::flush(self)?;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        WritableFile::flush(self)
    }

    fn close(&mut self) -> Result<()> {
        WritableFile::flush(self)
    }
}
