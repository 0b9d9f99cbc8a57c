use defectflow::engine::supercell::SupercellMatrix;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error(
        "Invalid supercell '{0}'. Expected three diagonal factors (e.g., '2,2,1' or '2x2x1') or nine matrix entries in row order."
    )]
    InvalidSupercell(String),

    #[error("Invalid override '{0}'. Expected KEY=VALUE.")]
    InvalidKeyValue(String),

    #[error("Component '{component}' cannot be empty in '{input}'.")]
    EmptyComponent {
        component: &'static str,
        input: String,
    },
}

/// Parses a tiling matrix from its command-line spelling.
///
/// Three integers are the diagonal of the matrix; nine integers are the full
/// matrix in row order. Integers may be separated by commas, `x` or whitespace.
pub fn parse_supercell(input: &str) -> Result<SupercellMatrix, ParseError> {
    let invalid = || ParseError::InvalidSupercell(input.to_string());
    let values = input
        .split(|c: char| c == ',' || c == 'x' || c == 'X' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .map(|token| token.parse::<i32>().map_err(|_| invalid()))
        .collect::<Result<Vec<_>, _>>()?;

    match values.as_slice() {
        [a, b, c] => Ok(SupercellMatrix::diagonal(*a, *b, *c)),
        [a, b, c, d, e, f, g, h, i] => Ok(SupercellMatrix::new([
            [*a, *b, *c],
            [*d, *e, *f],
            [*g, *h, *i],
        ])),
        _ => Err(invalid()),
    }
}

/// Splits a `KEY=VALUE` override at the first `=`.
pub fn parse_key_value(input: &str) -> Result<(&str, &str), ParseError> {
    let (key, value) = input
        .split_once('=')
        .ok_or_else(|| ParseError::InvalidKeyValue(input.to_string()))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(ParseError::EmptyComponent {
            component: "key",
            input: input.to_string(),
        });
    }
    Ok((key, value.trim()))
}
