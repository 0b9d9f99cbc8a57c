use crate::core::io::traits::StructureFile;
use crate::core::models::atom::Atom;
use crate::core::models::element::{Element, ElementError};
use crate::core::models::lattice::{Lattice, LatticeError};
use crate::core::models::structure::Structure;
use nalgebra::{Matrix3, Point3, Vector3};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufWriter, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum XyzError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("Invalid species on line {line}: {source}")]
    Species {
        line: usize,
        #[source]
        source: ElementError,
    },
    #[error("Invalid cell: {0}")]
    Lattice(#[from] LatticeError),
    #[error("Frame has {atoms} atoms but {forces} force vectors were supplied")]
    ForceCount { atoms: usize, forces: usize },
}

/// Splits an extended XYZ comment line into `key=value` pairs, honouring quotes.
fn parse_comment(comment: &str) -> HashMap<String, String> {
    let mut pairs = HashMap::new();
    let chars: Vec<char> = comment.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        while i < chars.len() && chars[i].is_whitespace() {
            i += 1;
        }
        let key_start = i;
        while i < chars.len() && chars[i] != '=' && !chars[i].is_whitespace() {
            i += 1;
        }
        let key: String = chars[key_start..i].iter().collect();
        if key.is_empty() {
            i += 1;
            continue;
        }
        if i >= chars.len() || chars[i] != '=' {
            pairs.insert(key.to_ascii_lowercase(), "T".to_string());
            continue;
        }
        i += 1;
        let value: String = if i < chars.len() && chars[i] == '"' {
            i += 1;
            let start = i;
            while i < chars.len() && chars[i] != '"' {
                i += 1;
            }
            let value = chars[start..i].iter().collect();
            i += 1;
            value
        } else {
            let start = i;
            while i < chars.len() && !chars[i].is_whitespace() {
                i += 1;
            }
            chars[start..i].iter().collect()
        };
        pairs.insert(key.to_ascii_lowercase(), value);
    }
    pairs
}

fn parse_lattice(value: &str, pbc: [bool; 3], line: usize) -> Result<Lattice, XyzError> {
    let numbers: Vec<f64> = value
        .split_whitespace()
        .map(str::parse)
        .collect::<Result<_, _>>()
        .map_err(|_| XyzError::Parse {
            line,
            message: format!("invalid Lattice value '{}'", value),
        })?;
    if numbers.len() != 9 {
        return Err(XyzError::Parse {
            line,
            message: format!("Lattice needs 9 numbers, found {}", numbers.len()),
        });
    }
    Ok(Lattice::new(Matrix3::from_row_slice(&numbers), pbc)?)
}

fn parse_pbc(value: &str) -> [bool; 3] {
    let flags: Vec<bool> = value
        .split_whitespace()
        .map(|f| matches!(f.to_ascii_uppercase().as_str(), "T" | "TRUE" | "1"))
        .collect();
    match flags.as_slice() {
        [a, b, c] => [*a, *b, *c],
        _ => [true; 3],
    }
}

/// Reads one frame from `lines`, returning `None` at a clean end of input.
fn read_frame(
    lines: &mut impl Iterator<Item = (usize, io::Result<String>)>,
) -> Result<Option<Structure>, XyzError> {
    let (count_line, header) = loop {
        match lines.next() {
            None => return Ok(None),
            Some((idx, line)) => {
                let line = line?;
                if !line.trim().is_empty() {
                    break (idx + 1, line);
                }
            }
        }
    };
    let count: usize = header.trim().parse().map_err(|_| XyzError::Parse {
        line: count_line,
        message: format!("expected an atom count, found '{}'", header.trim()),
    })?;

    let (comment_line, comment) = match lines.next() {
        Some((idx, line)) => (idx + 1, line?),
        None => {
            return Err(XyzError::Parse {
                line: count_line + 1,
                message: "missing comment line".into(),
            });
        }
    };
    let properties = parse_comment(&comment);
    let pbc = properties
        .get("pbc")
        .map(|v| parse_pbc(v))
        .unwrap_or([true; 3]);
    let lattice = match properties.get("lattice") {
        Some(value) => parse_lattice(value, pbc, comment_line)?,
        None => {
            // A free molecule gets a large non-periodic box.
            Lattice::cubic(100.0).with_pbc([false; 3])
        }
    };

    let mut structure = Structure::new(lattice);
    for expected in 0..count {
        let (idx, line) = lines.next().ok_or_else(|| XyzError::Parse {
            line: comment_line + expected + 1,
            message: format!("expected {} atom lines, found {}", count, expected),
        })?;
        let line = line?;
        let line_num = idx + 1;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            return Err(XyzError::Parse {
                line: line_num,
                message: "atom line needs a species and three coordinates".into(),
            });
        }
        let element = Element::from_label(fields[0]).map_err(|source| XyzError::Species {
            line: line_num,
            source,
        })?;
        let coord = |i: usize| {
            fields[i].parse::<f64>().map_err(|_| XyzError::Parse {
                line: line_num,
                message: format!("invalid coordinate '{}'", fields[i]),
            })
        };
        structure.push(Atom::new(element, Point3::new(coord(1)?, coord(2)?, coord(3)?)));
    }
    Ok(Some(structure))
}

fn format_lattice(lattice: &Lattice) -> String {
    let m = lattice.matrix();
    (0..3)
        .flat_map(|r| (0..3).map(move |c| (r, c)))
        .map(|(r, c)| format!("{:.8}", m[(r, c)]))
        .collect::<Vec<_>>()
        .join(" ")
}

fn format_pbc(pbc: [bool; 3]) -> String {
    pbc.iter()
        .map(|&p| if p { "T" } else { "F" })
        .collect::<Vec<_>>()
        .join(" ")
}

fn write_frame(
    structure: &Structure,
    energy: Option<f64>,
    forces: Option<&[Vector3<f64>]>,
    writer: &mut impl Write,
) -> Result<(), XyzError> {
    if let Some(forces) = forces {
        if forces.len() != structure.len() {
            return Err(XyzError::ForceCount {
                atoms: structure.len(),
                forces: forces.len(),
            });
        }
    }

    writeln!(writer, "{}", structure.len())?;
    let properties = if forces.is_some() {
        "species:S:1:pos:R:3:forces:R:3"
    } else {
        "species:S:1:pos:R:3"
    };
    write!(
        writer,
        "Lattice=\"{}\" Properties={}",
        format_lattice(structure.lattice()),
        properties
    )?;
    if let Some(energy) = energy {
        write!(writer, " energy={:.10}", energy)?;
    }
    writeln!(writer, " pbc=\"{}\"", format_pbc(structure.lattice().pbc()))?;

    for (i, atom) in structure.atoms().iter().enumerate() {
        let p = atom.position;
        write!(
            writer,
            "{:<3} {:>16.8} {:>16.8} {:>16.8}",
            atom.symbol(),
            p.x,
            p.y,
            p.z
        )?;
        if let Some(forces) = forces {
            let f = forces[i];
            write!(writer, " {:>16.8} {:>16.8} {:>16.8}", f.x, f.y, f.z)?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

/// Extended XYZ reader and writer.
///
/// Reading returns the first frame of the file. Without a `Lattice=` entry the
/// structure is placed in a non-periodic 100 Å box.
pub struct ExtXyzFile;

impl ExtXyzFile {
    /// Reads every frame of a multi-frame file.
    pub fn read_frames(reader: &mut impl BufRead) -> Result<Vec<Structure>, XyzError> {
        let mut lines = reader.lines().enumerate();
        let mut frames = Vec::new();
        while let Some(frame) = read_frame(&mut lines)? {
            frames.push(frame);
        }
        Ok(frames)
    }
}

impl StructureFile for ExtXyzFile {
    type Error = XyzError;

    fn read_from(reader: &mut impl BufRead) -> Result<Structure, Self::Error> {
        let mut lines = reader.lines().enumerate();
        read_frame(&mut lines)?.ok_or(XyzError::Parse {
            line: 1,
            message: "file contains no frames".into(),
        })
    }

    fn write_to(structure: &Structure, writer: &mut impl Write) -> Result<(), Self::Error> {
        write_frame(structure, None, None, writer)
    }
}

/// Appends optimisation frames, with energy and forces, to an extended XYZ file.
pub struct TrajectoryWriter {
    writer: BufWriter<File>,
    frames: usize,
}

impl TrajectoryWriter {
    /// Creates (or truncates) the trajectory file.
    pub fn create(path: &Path) -> Result<Self, XyzError> {
        Ok(Self {
            writer: BufWriter::new(File::create(path)?),
            frames: 0,
        })
    }

    /// Opens the trajectory file for appending, as used when an optimisation is restarted.
    pub fn append(path: &Path) -> Result<Self, XyzError> {
        let file = File::options().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            frames: 0,
        })
    }

    pub fn write(
        &mut self,
        structure: &Structure,
        energy: f64,
        forces: &[Vector3<f64>],
    ) -> Result<(), XyzError> {
        write_frame(structure, Some(energy), Some(forces), &mut self.writer)?;
        self.writer.flush()?;
        self.frames += 1;
        Ok(())
    }

    pub fn frames_written(&self) -> usize {
        self.frames
    }
}
