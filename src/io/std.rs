use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// File backed container, commits by writing a sibling temporary file and renaming it over
#[derive(Debug)]
pub struct FileIO {
    path: PathBuf,
    file: fs::File,
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path.file_name().map(|name| name.to_string_lossy()).unwrap_or_default();
    path.with_file_name(format!(".{}.{}.tmp", name, std::process::id()))
}

impl FileIO {
    pub fn open<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = fs::File::open(&path)?;
        Ok(Self { path, file })
    }

    /// Creates or truncates the file, content appears on first save
    pub fn create<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut options = fs::File::options();
        let file = options.read(true).write(true).create(true).truncate(true).open(&path)?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The returned handle keeps reading the image once it is renamed into place
    fn write_temp(temp: &Path, image: &[u8]) -> std::io::Result<fs::File> {
        let mut options = fs::File::options();
        let mut file = options.read(true).write(true).create(true).truncate(true).open(temp)?;
        file.write_all(image)?;
        file.sync_all()?;
        Ok(file)
    }
}

impl super::IO for FileIO {
    type Error = std::io::Error;

    fn len(&mut self) -> Result<u64, Self::Error> {
        Ok(self.file.metadata()?.len())
    }

    fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    fn commit(&mut self, image: &[u8]) -> Result<(), Self::Error> {
        let temp = temp_path(&self.path);
        let result =
            Self::write_temp(&temp, image).and_then(|file| fs::rename(&temp, &self.path).map(|_| file));
        self.file = match result {
            Ok(file) => file,
            Err(e) => {
                warn!("Commit to {} failed: {}", self.path.display(), e);
                fs::remove_file(&temp).ok();
                return Err(e);
            }
        };
        debug!("Committed {} bytes to {}", image.len(), self.path.display());
        Ok(())
    }
}
