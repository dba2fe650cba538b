use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::mips::Word;

/// Paths of the files produced for a single input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifacts {
    pub hex: PathBuf,
    pub bin: PathBuf,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("refusing to overwrite the input file {}", path.display())]
    WouldOverwriteInput { path: PathBuf },
    #[error("failed to write {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Artifacts {
    /// Output paths next to `input`, with its extension replaced.
    pub fn for_input(input: &Path) -> Result<Artifacts, Error> {
        let artifacts = Artifacts {
            hex: input.with_extension("hex"),
            bin: input.with_extension("bin"),
        };

        for path in &[&artifacts.hex, &artifacts.bin] {
            if path.as_path() == input {
                return Err(Error::WouldOverwriteInput {
                    path: path.to_path_buf(),
                });
            }
        }

        Ok(artifacts)
    }

    /// Writes both artifacts. Either file may be left partially written if this fails.
    pub fn write(&self, words: &[Word]) -> Result<(), Error> {
        write_file(&self.hex, |out| write_hex(words, out))?;
        write_file(&self.bin, |out| write_binary(words, out))?;

        info!("wrote {} and {}", self.hex.display(), self.bin.display());
        Ok(())
    }
}

fn write_file(
    path: &Path,
    contents: impl FnOnce(&mut BufWriter<File>) -> io::Result<()>,
) -> Result<(), Error> {
    let io_error = |source| Error::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut out = BufWriter::new(File::create(path).map_err(io_error)?);
    contents(&mut out).map_err(io_error)?;
    out.flush().map_err(io_error)
}

/// One big-endian word per line, as 8 uppercase hex digits.
pub fn write_hex(words: &[Word], mut out: impl Write) -> io::Result<()> {
    for word in words {
        writeln!(out, "{:08X}", word)?;
    }
    Ok(())
}

/// Every word as 4 little-endian bytes.
pub fn write_binary(words: &[Word], mut out: impl Write) -> io::Result<()> {
    for word in words {
        out.write_all(&word.to_le_bytes())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_lines() {
        let mut out = Vec::new();
        write_hex(&[0x3C1D_7FFF, 0xC, 0], &mut out).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "3C1D7FFF\n0000000C\n00000000\n"
        );
    }

    #[test]
    fn binary_is_little_endian() {
        let mut out = Vec::new();
        write_binary(&[0x3C1D_7FFF, 0x0000_000C], &mut out).unwrap();

        assert_eq!(out, vec![0xFF, 0x7F, 0x1D, 0x3C, 0x0C, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn artifact_paths_replace_the_extension() {
        let artifacts = Artifacts::for_input(Path::new("samples/sample1.vm")).unwrap();

        assert_eq!(artifacts.hex, Path::new("samples/sample1.hex"));
        assert_eq!(artifacts.bin, Path::new("samples/sample1.bin"));

        let artifacts = Artifacts::for_input(Path::new("program")).unwrap();
        assert_eq!(artifacts.hex, Path::new("program.hex"));
    }

    #[test]
    fn input_is_never_overwritten() {
        let err = Artifacts::for_input(Path::new("out/program.bin")).unwrap_err();
        assert!(matches!(err, Error::WouldOverwriteInput { .. }));
    }

    #[test]
    fn writes_both_files() {
        let dir = std::env::temp_dir().join(format!("vmc-output-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let artifacts = Artifacts::for_input(&dir.join("program.vm")).unwrap();
        artifacts.write(&[0x0C10_000B]).unwrap();

        assert_eq!(std::fs::read_to_string(&artifacts.hex).unwrap(), "0C10000B\n");
        assert_eq!(std::fs::read(&artifacts.bin).unwrap(), vec![0x0B, 0x00, 0x10, 0x0C]);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
