use crate::common_io::*;
use crate::point_sequence::*;
use log::{info, warn};
use rayon::prelude::*;
use std::path::Path;

/// Where point sequences come from. Conversion from map files to
/// point sequences happens upstream; readers only parse the result.
pub trait PointSequenceSource {
    fn read_sequences(&self) -> anyhow::Result<Vec<PointSequence>>;
}

/// One file holding one sequence
///
/// * `*.json` - `{"name": .., "points": [[x, y], ..]}`
/// * anything else - one `x y` pair per line, separated by tab, comma,
///   or spaces; `#`/`%` comment lines and blank lines are skipped
///
/// A trailing `.gz` means gzip.
pub struct PointFile {
    pub path: Box<str>,
}

impl PointFile {
    pub fn new(path: &str) -> Self {
        Self { path: path.into() }
    }

    fn read_json(&self) -> anyhow::Result<PointSequence> {
        let reader = open_buf_reader(&self.path)?;
        let seq: PointSequence = serde_json::from_reader(reader)
            .map_err(|e| anyhow::anyhow!("{}: {}", self.path, e))?;
        Ok(seq)
    }

    fn read_text(&self) -> anyhow::Result<PointSequence> {
        let points = read_lines(&self.path)?
            .iter()
            .enumerate()
            .filter(|(_, line)| !is_skipped_line(line))
            .map(|(i, line)| {
                parse_point_line(line).ok_or_else(|| {
                    anyhow::anyhow!("{}:{}: expected `x y`, got {:?}", self.path, i + 1, line)
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(PointSequence::new(&basename(&self.path)?, points))
    }
}

impl PointSequenceSource for PointFile {
    fn read_sequences(&self) -> anyhow::Result<Vec<PointSequence>> {
        let seq = match file_ext(&self.path).as_ref() {
            "json" => self.read_json()?,
            _ => self.read_text()?,
        };

        if let Some(p) = seq.points.iter().find(|p| !p.is_finite()) {
            return Err(anyhow::anyhow!("{}: non-finite point {:?}", self.path, p));
        }
        Ok(vec![seq])
    }
}

/// `tsv`, `txt`, `csv` or `json`, optionally gzipped
pub fn is_point_file(file: &str) -> bool {
    matches!(file_ext(file).as_ref(), "tsv" | "txt" | "csv" | "json")
}

fn is_skipped_line(line: &str) -> bool {
    let line = line.trim();
    line.is_empty() || line.starts_with('#') || line.starts_with('%')
}

fn parse_point_line(line: &str) -> Option<Point> {
    let mut words = line
        .split(|c: char| c == '\t' || c == ',' || c.is_whitespace())
        .filter(|w| !w.is_empty());
    let x = words.next()?.parse::<f32>().ok()?;
    let y = words.next()?.parse::<f32>().ok()?;
    match words.next() {
        Some(_) => None,
        None => Some(Point::new(x, y)),
    }
}

/// Many files, read in parallel and returned in input order
pub struct PointFileList {
    pub files: Vec<Box<str>>,
}

impl PointFileList {
    /// Expand each path: directories contribute their point files
    /// (sorted by name, see [`is_point_file`]), files are taken as they are
    pub fn from_paths(paths: &[Box<str>]) -> anyhow::Result<Self> {
        let mut files = vec![];
        for path in paths {
            let p = Path::new(path.as_ref());
            if p.is_dir() {
                let (mut dir_files, skipped): (Vec<Box<str>>, Vec<Box<str>>) =
                    std::fs::read_dir(p)?
                        .map(|entry| entry.map(|e| e.path()))
                        .collect::<std::io::Result<Vec<_>>>()?
                        .into_iter()
                        .filter(|f| f.is_file())
                        .filter_map(|f| f.to_str().map(|s| s.into()))
                        .partition(|f: &Box<str>| is_point_file(f));
                dir_files.sort();
                info!("{}: {} files", path, dir_files.len());
                if !skipped.is_empty() {
                    warn!("{}: skipped {} other files", path, skipped.len());
                }
                files.extend(dir_files);
            } else {
                files.push(path.clone());
            }
        }

        if files.is_empty() {
            return Err(anyhow::anyhow!("no input files"));
        }
        Ok(Self { files })
    }
}

impl PointSequenceSource for PointFileList {
    fn read_sequences(&self) -> anyhow::Result<Vec<PointSequence>> {
        let nested = self
            .files
            .par_iter()
            .map(|f| PointFile::new(f).read_sequences())
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(nested.into_iter().flatten().collect())
    }
}

///
/// Write a sequence as `x<TAB>y` lines with a `# name` header
///
/// * `seq` - point sequence
/// * `output_file` - file name--either gzipped or not
///
pub fn write_point_sequence(seq: &PointSequence, output_file: &str) -> anyhow::Result<()> {
    mkdir(output_file)?;
    let mut lines: Vec<Box<str>> = Vec::with_capacity(seq.len() + 1);
    lines.push(format!("# {}", seq.name).into_boxed_str());
    lines.extend(seq.points.iter().map(|p| p.to_string().into_boxed_str()));
    write_lines(&lines, output_file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_point_line() {
        assert_eq!(parse_point_line("1\t2"), Some(Point::new(1., 2.)));
        assert_eq!(parse_point_line("  -3.5, 4 "), Some(Point::new(-3.5, 4.)));
        assert_eq!(parse_point_line("5 6"), Some(Point::new(5., 6.)));
        assert_eq!(parse_point_line("5"), None);
        assert_eq!(parse_point_line("5 6 7"), None);
        assert_eq!(parse_point_line("a b"), None);
        assert!(is_skipped_line("# E1M1"));
        assert!(is_skipped_line("   "));
    }
}
