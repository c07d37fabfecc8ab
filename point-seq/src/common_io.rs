use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

///
/// Read every line of the input_file into memory
///
/// * `input_file` - file name--either gzipped or not
///
pub fn read_lines(input_file_path: &str) -> anyhow::Result<Vec<Box<str>>> {
    let buf: Box<dyn BufRead> = open_buf_reader(input_file_path)?;
    let mut lines = vec![];
    for x in buf.lines() {
        lines.push(x?.into_boxed_str());
    }
    Ok(lines)
}

///
/// Write every line into the output_file
///
/// * `lines` - vector of lines
/// * `output_file` - file name--either gzipped or not
///
pub fn write_lines<T>(lines: &[T], output_file_path: &str) -> anyhow::Result<()>
where
    T: std::fmt::Display,
{
    let mut buf = open_buf_writer(output_file_path)?;
    for line in lines {
        if let Err(e) = writeln!(buf, "{}", line) {
            if e.kind() == std::io::ErrorKind::BrokenPipe {
                return Ok(());
            } else {
                return Err(anyhow::anyhow!("unexpected error: {}", e));
            }
        }
    }
    buf.flush()?;
    Ok(())
}

///
/// Open a file for reading, and return a buffered reader
/// * `input_file` - file name--either gzipped or not
pub fn open_buf_reader(input_file: &str) -> anyhow::Result<Box<dyn BufRead>> {
    let file = File::open(input_file)
        .map_err(|e| anyhow::anyhow!("failed to open {}: {}", input_file, e))?;
    match Path::new(input_file).extension().and_then(|x| x.to_str()) {
        Some("gz") => Ok(Box::new(BufReader::new(GzDecoder::new(file)))),
        _ => Ok(Box::new(BufReader::new(file))),
    }
}

///
/// Open a file for writing, and return a buffered writer
/// * `output_file` - file name--either gzipped or not
pub fn open_buf_writer(output_file: &str) -> anyhow::Result<Box<dyn Write>> {
    // we can simply override with stdout
    if output_file.eq_ignore_ascii_case("stdout") {
        return Ok(Box::new(BufWriter::new(std::io::stdout())));
    }

    let file = File::create(output_file)
        .map_err(|e| anyhow::anyhow!("failed to create {}: {}", output_file, e))?;
    match Path::new(output_file).extension().and_then(|x| x.to_str()) {
        Some("gz") => {
            let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
            Ok(Box::new(BufWriter::new(encoder)))
        }
        _ => Ok(Box::new(BufWriter::new(file))),
    }
}

///
/// Create a directory if needed
/// * `file` - file name
///
pub fn mkdir(file: &str) -> anyhow::Result<()> {
    if let Some(dir) = Path::new(file).parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }
    Ok(())
}

///
/// Lower-case extension, looking through a trailing `.gz`
/// (`map.tsv.gz` -> `tsv`)
///
pub fn file_ext(file: &str) -> Box<str> {
    let lower = file.to_lowercase();
    let stem = lower.strip_suffix(".gz").unwrap_or(&lower);
    Path::new(stem)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .into()
}

///
/// Take the basename of a file, dropping `.gz` and the format extension
/// * `file` - file name
///
pub fn basename(file: &str) -> anyhow::Result<Box<str>> {
    let stem = file.strip_suffix(".gz").unwrap_or(file);
    Path::new(stem)
        .file_stem()
        .and_then(|b| b.to_str())
        .map(|b| b.into())
        .ok_or(anyhow::anyhow!("no file stem: {}", file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_ext_and_basename() -> anyhow::Result<()> {
        assert_eq!(file_ext("a/b/E1M1.tsv.gz").as_ref(), "tsv");
        assert_eq!(file_ext("E1M1.JSON").as_ref(), "json");
        assert_eq!(file_ext("noext").as_ref(), "");
        assert_eq!(basename("a/b/E1M1.tsv.gz")?.as_ref(), "E1M1");
        assert_eq!(basename("MAP01.json")?.as_ref(), "MAP01");
        Ok(())
    }

    #[test]
    fn test_gz_lines_round_trip() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let file = dir.path().join("lines.txt.gz");
        let file = file.to_str().ok_or(anyhow::anyhow!("path"))?;
        let lines: Vec<Box<str>> = vec!["1\t2".into(), "# comment".into(), "3,4".into()];
        write_lines(&lines, file)?;
        assert_eq!(read_lines(file)?, lines);
        Ok(())
    }
}
