use crate::core::io::traits::StructureFile;
use crate::core::models::atom::Atom;
use crate::core::models::element::{Element, ElementError};
use crate::core::models::lattice::{Lattice, LatticeError};
use crate::core::models::structure::Structure;
use nalgebra::{Matrix3, Vector3};
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use thiserror::Error;

/// Cartesian distance below which two symmetry images are the same site.
const DUPLICATE_TOLERANCE: f64 = 1e-3;

const SYMMETRY_TAGS: [&str; 2] = [
    "_symmetry_equiv_pos_as_xyz",
    "_space_group_symop_operation_xyz",
];

#[derive(Debug, Error)]
pub enum CifError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("Missing required field: {0}")]
    MissingField(String),
    #[error("Invalid numeric value for {tag}: '{value}'")]
    InvalidNumber { tag: String, value: String },
    #[error("Invalid symmetry operation '{op}': {reason}")]
    InvalidSymmetryOperation { op: String, reason: String },
    #[error("Invalid species on line {line}: {source}")]
    Species {
        line: usize,
        #[source]
        source: ElementError,
    },
    #[error("Invalid cell: {0}")]
    Lattice(#[from] LatticeError),
    #[error("No atom sites with fractional coordinates were found")]
    NoAtoms,
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    text: String,
    line: usize,
    quoted: bool,
}

#[derive(Debug, Default)]
struct CifLoop {
    tags: Vec<String>,
    values: Vec<Token>,
}

impl CifLoop {
    fn column(&self, tag: &str) -> Option<usize> {
        self.tags.iter().position(|t| t == tag)
    }

    fn rows(&self) -> impl Iterator<Item = &[Token]> {
        self.values.chunks(self.tags.len().max(1))
    }
}

#[derive(Debug, Default)]
struct CifBlock {
    name: String,
    items: HashMap<String, Token>,
    loops: Vec<CifLoop>,
}

/// An affine symmetry operation acting on fractional coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct SymmetryOperation {
    rotation: Matrix3<f64>,
    translation: Vector3<f64>,
}

impl SymmetryOperation {
    pub fn identity() -> Self {
        Self {
            rotation: Matrix3::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Parses a Jones-faithful operation such as `"-x+y, -x, z+1/2"`.
    pub fn parse(op: &str) -> Result<Self, CifError> {
        let invalid = |reason: &str| CifError::InvalidSymmetryOperation {
            op: op.to_string(),
            reason: reason.to_string(),
        };
        let components: Vec<&str> = op.split(',').collect();
        if components.len() != 3 {
            return Err(invalid("expected three comma-separated components"));
        }

        let mut rotation = Matrix3::zeros();
        let mut translation = Vector3::zeros();
        for (row, expr) in components.iter().enumerate() {
            let cleaned: String = expr
                .chars()
                .filter(|c| !c.is_whitespace())
                .map(|c| c.to_ascii_lowercase())
                .collect();
            if cleaned.is_empty() {
                return Err(invalid("empty component"));
            }

            let mut terms = Vec::new();
            let mut current = String::new();
            for c in cleaned.chars() {
                if (c == '+' || c == '-') && !current.is_empty() {
                    terms.push(std::mem::take(&mut current));
                }
                current.push(c);
            }
            terms.push(current);

            for term in terms {
                let (sign, body) = match term.strip_prefix('-') {
                    Some(rest) => (-1.0, rest),
                    None => (1.0, term.strip_prefix('+').unwrap_or(&term)),
                };
                let axis = body.find(['x', 'y', 'z']);
                match axis {
                    Some(pos) => {
                        let column = match &body[pos..pos + 1] {
                            "x" => 0,
                            "y" => 1,
                            _ => 2,
                        };
                        let coefficient = body[..pos].trim_end_matches('*');
                        let trailing = &body[pos + 1..];
                        if !trailing.is_empty() {
                            return Err(invalid("unexpected characters after axis"));
                        }
                        let value = if coefficient.is_empty() {
                            1.0
                        } else {
                            parse_fraction(coefficient).ok_or_else(|| invalid("bad coefficient"))?
                        };
                        rotation[(row, column)] += sign * value;
                    }
                    None => {
                        let value = parse_fraction(body).ok_or_else(|| invalid("bad constant"))?;
                        translation[row] += sign * value;
                    }
                }
            }
        }
        Ok(Self {
            rotation,
            translation,
        })
    }

    pub fn apply(&self, fractional: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * fractional + self.translation
    }
}

fn parse_fraction(s: &str) -> Option<f64> {
    match s.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            (den != 0.0).then(|| num / den)
        }
        None => s.parse().ok(),
    }
}

/// Parses a CIF number, discarding a trailing standard uncertainty such as `(3)`.
fn parse_cif_number(tag: &str, token: &Token) -> Result<f64, CifError> {
    let clean = token.text.split('(').next().unwrap_or("");
    clean.parse().map_err(|_| CifError::InvalidNumber {
        tag: tag.to_string(),
        value: token.text.clone(),
    })
}

fn tokenize(reader: &mut impl BufRead) -> Result<Vec<Token>, CifError> {
    let mut tokens = Vec::new();
    let mut text_field: Option<(usize, String)> = None;

    for (line_idx, line_res) in reader.lines().enumerate() {
        let line = line_res?;
        let line_num = line_idx + 1;

        if let Some((start, mut buffer)) = text_field.take() {
            if line.starts_with(';') {
                tokens.push(Token {
                    text: buffer.trim().to_string(),
                    line: start,
                    quoted: true,
                });
            } else {
                buffer.push_str(&line);
                buffer.push('\n');
                text_field = Some((start, buffer));
            }
            continue;
        }
        if let Some(rest) = line.strip_prefix(';') {
            text_field = Some((line_num, format!("{}\n", rest)));
            continue;
        }

        let chars: Vec<char> = line.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            if c.is_whitespace() {
                i += 1;
                continue;
            }
            if c == '#' {
                break;
            }
            if c == '\'' || c == '"' {
                let quote = c;
                let start = i + 1;
                let mut end = start;
                loop {
                    if end >= chars.len() {
                        return Err(CifError::Parse {
                            line: line_num,
                            message: "unterminated quoted string".into(),
                        });
                    }
                    if chars[end] == quote
                        && (end + 1 == chars.len() || chars[end + 1].is_whitespace())
                    {
                        break;
                    }
                    end += 1;
                }
                tokens.push(Token {
                    text: chars[start..end].iter().collect(),
                    line: line_num,
                    quoted: true,
                });
                i = end + 1;
                continue;
            }
            let start = i;
            while i < chars.len() && !chars[i].is_whitespace() {
                i += 1;
            }
            tokens.push(Token {
                text: chars[start..i].iter().collect(),
                line: line_num,
                quoted: false,
            });
        }
    }

    if let Some((start, _)) = text_field {
        return Err(CifError::Parse {
            line: start,
            message: "unterminated semicolon text field".into(),
        });
    }
    Ok(tokens)
}

fn is_keyword(token: &Token) -> bool {
    if token.quoted {
        return false;
    }
    let lower = token.text.to_ascii_lowercase();
    lower.starts_with('_')
        || lower == "loop_"
        || lower.starts_with("data_")
        || lower.starts_with("save_")
        || lower == "stop_"
        || lower == "global_"
}

/// Groups the tokens of the first data block into tag/value items and loops.
fn parse_block(tokens: Vec<Token>) -> Result<CifBlock, CifError> {
    let mut block = CifBlock::default();
    let mut seen_data = false;
    let mut iter = tokens.into_iter().peekable();

    while let Some(token) = iter.next() {
        let lower = token.text.to_ascii_lowercase();
        if !token.quoted && lower.starts_with("data_") {
            if seen_data {
                break;
            }
            seen_data = true;
            block.name = token.text["data_".len()..].to_string();
        } else if !token.quoted && lower == "loop_" {
            let mut cif_loop = CifLoop::default();
            while let Some(next) = iter.peek() {
                if !next.quoted && next.text.starts_with('_') {
                    cif_loop.tags.push(next.text.to_ascii_lowercase());
                    iter.next();
                } else {
                    break;
                }
            }
            if cif_loop.tags.is_empty() {
                return Err(CifError::Parse {
                    line: token.line,
                    message: "loop_ without tags".into(),
                });
            }
            while let Some(next) = iter.peek() {
                if is_keyword(next) {
                    break;
                }
                if let Some(value) = iter.next() {
                    cif_loop.values.push(value);
                }
            }
            if cif_loop.values.len() % cif_loop.tags.len() != 0 {
                return Err(CifError::Parse {
                    line: token.line,
                    message: format!(
                        "loop has {} values, not a multiple of its {} tags",
                        cif_loop.values.len(),
                        cif_loop.tags.len()
                    ),
                });
            }
            block.loops.push(cif_loop);
        } else if !token.quoted && token.text.starts_with('_') {
            let value = match iter.peek() {
                Some(next) if !is_keyword(next) => iter.next(),
                _ => None,
            };
            let value = value.ok_or_else(|| CifError::Parse {
                line: token.line,
                message: format!("tag {} has no value", token.text),
            })?;
            block.items.insert(lower, value);
        }
    }
    Ok(block)
}

fn cell_from_block(block: &CifBlock) -> Result<Lattice, CifError> {
    let number = |tag: &str, default: Option<f64>| -> Result<f64, CifError> {
        match block.items.get(tag) {
            Some(token) => parse_cif_number(tag, token),
            None => default.ok_or_else(|| CifError::MissingField(tag.to_string())),
        }
    };
    let lengths = [
        number("_cell_length_a", None)?,
        number("_cell_length_b", None)?,
        number("_cell_length_c", None)?,
    ];
    let angles = [
        number("_cell_angle_alpha", Some(90.0))?,
        number("_cell_angle_beta", Some(90.0))?,
        number("_cell_angle_gamma", Some(90.0))?,
    ];
    Ok(Lattice::from_parameters(lengths, angles)?)
}

fn symmetry_from_block(block: &CifBlock) -> Result<Vec<SymmetryOperation>, CifError> {
    for cif_loop in &block.loops {
        for tag in SYMMETRY_TAGS {
            if let Some(column) = cif_loop.column(tag) {
                return cif_loop
                    .rows()
                    .map(|row| SymmetryOperation::parse(&row[column].text))
                    .collect();
            }
        }
    }
    for tag in SYMMETRY_TAGS {
        if let Some(token) = block.items.get(tag) {
            return Ok(vec![SymmetryOperation::parse(&token.text)?]);
        }
    }
    Ok(vec![SymmetryOperation::identity()])
}

fn asymmetric_sites(block: &CifBlock) -> Result<Vec<(Element, Vector3<f64>)>, CifError> {
    let atom_loop = block
        .loops
        .iter()
        .find(|l| l.column("_atom_site_fract_x").is_some())
        .ok_or(CifError::NoAtoms)?;

    let column = |tag: &str| {
        atom_loop
            .column(tag)
            .ok_or_else(|| CifError::MissingField(tag.to_string()))
    };
    let (cx, cy, cz) = (
        column("_atom_site_fract_x")?,
        column("_atom_site_fract_y")?,
        column("_atom_site_fract_z")?,
    );
    let species_column = atom_loop
        .column("_atom_site_type_symbol")
        .or_else(|| atom_loop.column("_atom_site_label"))
        .ok_or_else(|| CifError::MissingField("_atom_site_type_symbol".into()))?;

    atom_loop
        .rows()
        .map(|row| {
            let species = &row[species_column];
            let element = Element::from_label(&species.text).map_err(|source| CifError::Species {
                line: species.line,
                source,
            })?;
            let frac = Vector3::new(
                parse_cif_number("_atom_site_fract_x", &row[cx])?,
                parse_cif_number("_atom_site_fract_y", &row[cy])?,
                parse_cif_number("_atom_site_fract_z", &row[cz])?,
            );
            Ok((element, frac))
        })
        .collect()
}

/// Crystallographic Information File reader and P1 writer.
///
/// Reading expands the asymmetric unit with the listed symmetry operations, wraps
/// the images into the cell and drops duplicates. Writing emits every atom as its
/// own site in structure order, so a written file reads back with the same atom order.
pub struct CifFile;

impl StructureFile for CifFile {
    type Error = CifError;

    fn read_from(reader: &mut impl BufRead) -> Result<Structure, Self::Error> {
        let tokens = tokenize(reader)?;
        let block = parse_block(tokens)?;
        let lattice = cell_from_block(&block)?;
        let operations = symmetry_from_block(&block)?;
        let sites = asymmetric_sites(&block)?;
        if sites.is_empty() {
            return Err(CifError::NoAtoms);
        }

        let mut structure = Structure::new(lattice.clone());
        let mut placed: Vec<Vector3<f64>> = Vec::new();
        for (element, frac) in sites {
            for op in &operations {
                let image = op.apply(&frac).map(|x| x.rem_euclid(1.0));
                let is_duplicate = placed.iter().any(|existing| {
                    let delta = (image - existing).map(|d| d - d.round());
                    lattice.to_cartesian(&delta).coords.norm() < DUPLICATE_TOLERANCE
                });
                if !is_duplicate {
                    placed.push(image);
                    structure.push(Atom::new(element, lattice.to_cartesian(&image)));
                }
            }
        }
        Ok(structure)
    }

    fn write_to(structure: &Structure, writer: &mut impl Write) -> Result<(), Self::Error> {
        let lattice = structure.lattice();
        let (lengths, angles) = lattice.parameters();

        writeln!(writer, "data_{}", structure.formula())?;
        writeln!(writer, "_symmetry_space_group_name_H-M    'P 1'")?;
        writeln!(writer, "_symmetry_Int_Tables_number       1")?;
        writeln!(writer)?;
        writeln!(writer, "_cell_length_a       {:.8}", lengths[0])?;
        writeln!(writer, "_cell_length_b       {:.8}", lengths[1])?;
        writeln!(writer, "_cell_length_c       {:.8}", lengths[2])?;
        writeln!(writer, "_cell_angle_alpha    {:.8}", angles[0])?;
        writeln!(writer, "_cell_angle_beta     {:.8}", angles[1])?;
        writeln!(writer, "_cell_angle_gamma    {:.8}", angles[2])?;
        writeln!(writer)?;
        writeln!(writer, "loop_")?;
        writeln!(writer, "  _symmetry_equiv_pos_as_xyz")?;
        writeln!(writer, "  'x, y, z'")?;
        writeln!(writer)?;
        writeln!(writer, "loop_")?;
        writeln!(writer, "  _atom_site_label")?;
        writeln!(writer, "  _atom_site_type_symbol")?;
        writeln!(writer, "  _atom_site_fract_x")?;
        writeln!(writer, "  _atom_site_fract_y")?;
        writeln!(writer, "  _atom_site_fract_z")?;
        writeln!(writer, "  _atom_site_occupancy")?;

        // Cell parameters fix the orientation on read-back, so fractional
        // coordinates are what must be preserved.
        let mut label_counts: HashMap<Element, usize> = HashMap::new();
        for atom in structure.atoms() {
            let count = label_counts.entry(atom.element).or_insert(0);
            *count += 1;
            let frac = lattice.to_fractional(&atom.position);
            writeln!(
                writer,
                "  {:<6} {:<3} {:>12.8} {:>12.8} {:>12.8} 1.0000",
                format!("{}{}", atom.symbol(), count),
                atom.symbol(),
                frac.x,
                frac.y,
                frac.z
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;
    use std::io::{BufReader, Cursor};

    const SIC_4H: &str = r#"# 4H-SiC, P6_3mc
data_SiC
_symmetry_space_group_name_H-M   'P 63 m c'
_cell_length_a   3.0810(2)
_cell_length_b   3.0810
_cell_length_c   10.0830
_cell_angle_alpha   90.0
_cell_angle_beta   90.0
_cell_angle_gamma   120.0
loop_
 _symmetry_equiv_pos_as_xyz
  'x, y, z'
  '-y, x-y, z'
  '-x+y, -x, z'
  '-x, -y, z+1/2'
  'y, -x+y, z+1/2'
  'x-y, x, z+1/2'
loop_
 _atom_site_label
 _atom_site_type_symbol
 _atom_site_fract_x
 _atom_site_fract_y
 _atom_site_fract_z
 _atom_site_occupancy
  Si1  Si  0.00000  0.00000  0.18750  1
  Si2  Si  0.33333  0.66667  0.43750  1
  C1   C   0.00000  0.00000  0.00000  1
  C2   C   0.33333  0.66667  0.25000  1
"#;

    fn read_str(content: &str) -> Result<Structure, CifError> {
        CifFile::read_from(&mut BufReader::new(Cursor::new(content)))
    }

    #[test]
    fn reads_and_expands_hexagonal_4h_sic() {
        let structure = read_str(SIC_4H).unwrap();
        assert_eq!(structure.len(), 8);
        let si = Element::from_symbol("Si").unwrap();
        let c = Element::from_symbol("C").unwrap();
        assert_eq!(structure.count_of(si), 4);
        assert_eq!(structure.count_of(c), 4);
        let (lengths, angles) = structure.lattice().parameters();
        assert!((lengths[0] - 3.081).abs() < 1e-9);
        assert!((angles[2] - 120.0).abs() < 1e-9);
        assert!(structure.atoms()[..4].iter().all(|a| a.element == si));
    }

    #[test]
    fn symmetry_operation_parses_translations_and_combinations() {
        let op = SymmetryOperation::parse("-x+y, -x, z+1/2").unwrap();
        let image = op.apply(&Vector3::new(0.1, 0.2, 0.3));
        assert!((image - Vector3::new(0.1, -0.1, 0.8)).norm() < 1e-12);

        let op = SymmetryOperation::parse("1/2+x, 0.5-y, -z").unwrap();
        let image = op.apply(&Vector3::new(0.1, 0.2, 0.3));
        assert!((image - Vector3::new(0.6, 0.3, -0.3)).norm() < 1e-12);
    }

    #[test]
    fn symmetry_operation_rejects_garbage() {
        assert!(SymmetryOperation::parse("x, y").is_err());
        assert!(SymmetryOperation::parse("x, y, q").is_err());
        assert!(SymmetryOperation::parse("x, y, 1/0").is_err());
    }

    #[test]
    fn missing_cell_length_is_reported() {
        let content = "data_x\n_cell_length_a 3.0\n_cell_length_b 3.0\nloop_\n_atom_site_type_symbol\n_atom_site_fract_x\n_atom_site_fract_y\n_atom_site_fract_z\nSi 0 0 0\n";
        assert!(matches!(read_str(content), Err(CifError::MissingField(f)) if f == "_cell_length_c"));
    }

    #[test]
    fn unknown_species_is_reported_with_line() {
        let content = "data_x\n_cell_length_a 3.0\n_cell_length_b 3.0\n_cell_length_c 3.0\nloop_\n_atom_site_type_symbol\n_atom_site_fract_x\n_atom_site_fract_y\n_atom_site_fract_z\nQq 0 0 0\n";
        assert!(matches!(read_str(content), Err(CifError::Species { line: 10, .. })));
    }

    #[test]
    fn file_without_atom_loop_is_rejected() {
        let content = "data_x\n_cell_length_a 3.0\n_cell_length_b 3.0\n_cell_length_c 3.0\n";
        assert!(matches!(read_str(content), Err(CifError::NoAtoms)));
    }

    #[test]
    fn ragged_loop_is_rejected() {
        let content = "data_x\n_cell_length_a 3.0\n_cell_length_b 3.0\n_cell_length_c 3.0\nloop_\n_atom_site_type_symbol\n_atom_site_fract_x\n_atom_site_fract_y\n_atom_site_fract_z\nSi 0 0\n";
        assert!(matches!(read_str(content), Err(CifError::Parse { .. })));
    }

    #[test]
    fn semicolon_text_fields_are_skipped_as_single_values() {
        let content = "data_x\n_publ_section_title\n;\nA multi-line\ntitle with 'quotes'\n;\n_cell_length_a 2.0\n_cell_length_b 2.0\n_cell_length_c 2.0\nloop_\n_atom_site_label\n_atom_site_fract_x\n_atom_site_fract_y\n_atom_site_fract_z\nFe1 0 0 0\nFe2 0.5 0.5 0.5\n";
        let structure = read_str(content).unwrap();
        assert_eq!(structure.len(), 2);
        assert_eq!(structure.atoms()[1].symbol(), "Fe");
    }

    #[test]
    fn write_then_read_preserves_order_species_and_positions() {
        let lattice = Lattice::from_parameters([6.162, 6.162, 10.083], [90.0, 90.0, 120.0]).unwrap();
        let mut structure = Structure::new(lattice.clone());
        for (i, symbol) in ["C", "Si", "O", "Si", "C"].iter().enumerate() {
            let frac = Vector3::new(0.1 * i as f64, 0.05 * i as f64, 0.9 - 0.15 * i as f64);
            structure.push(Atom::new(
                Element::from_symbol(symbol).unwrap(),
                lattice.to_cartesian(&frac),
            ));
        }

        let mut buffer = Vec::new();
        CifFile::write_to(&structure, &mut buffer).unwrap();
        let text = String::from_utf8(buffer.clone()).unwrap();
        assert!(text.starts_with("data_C2OSi2"));
        assert!(text.contains("O1"));

        let back = read_str(&text).unwrap();
        assert_eq!(back.len(), structure.len());
        for (a, b) in structure.atoms().iter().zip(back.atoms()) {
            assert_eq!(a.element, b.element);
            assert!((a.position - b.position).norm() < 1e-6);
        }
    }

    #[test]
    fn reads_written_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cell.cif");
        let mut structure = Structure::new(Lattice::cubic(4.0));
        structure.push(Atom::new(
            Element::from_symbol("Si").unwrap(),
            Point3::new(1.0, 1.0, 1.0),
        ));
        CifFile::write_to_path(&structure, &path).unwrap();
        let back = CifFile::read_from_path(&path).unwrap();
        assert_eq!(back.len(), 1);
        assert!((back.atoms()[0].position - Point3::new(1.0, 1.0, 1.0)).norm() < 1e-6);
    }
}
