//! Observed site data
//!
//! A [`SiteContainer`] stores, for every sequence, a `states x sites`
//! matrix of partial likelihoods: entry `(state, site)` is the likelihood
//! of the observation at `site` given `state`. Hard observations are
//! one-hot columns, ambiguity codes set several entries to one.

use crate::error::{Error, Result};
use crate::tensor::Dimension;
use ndarray::Array2;
use std::collections::HashMap;

/// Character alphabet used to read sequences
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Alphabet {
    /// `0` / `1`, with `-` and `?` as unknown
    Binary,
    /// Nucleotides `ACGT` (`U` read as `T`) with IUPAC ambiguity codes
    Dna,
}

impl Alphabet {
    /// Number of states
    pub fn number_of_states(self) -> usize {
        match self {
            Alphabet::Binary => 2,
            Alphabet::Dna => 4,
        }
    }

    /// Partial likelihood column of one character
    pub fn likelihoods(self, symbol: char) -> Result<Vec<f64>> {
        let mask: &[usize] = match (self, symbol.to_ascii_uppercase()) {
            (Alphabet::Binary, '0') => &[0],
            (Alphabet::Binary, '1') => &[1],
            (Alphabet::Binary, '-' | '?') => &[0, 1],

            (Alphabet::Dna, 'A') => &[0],
            (Alphabet::Dna, 'C') => &[1],
            (Alphabet::Dna, 'G') => &[2],
            (Alphabet::Dna, 'T' | 'U') => &[3],
            (Alphabet::Dna, 'R') => &[0, 2],
            (Alphabet::Dna, 'Y') => &[1, 3],
            (Alphabet::Dna, 'S') => &[1, 2],
            (Alphabet::Dna, 'W') => &[0, 3],
            (Alphabet::Dna, 'K') => &[2, 3],
            (Alphabet::Dna, 'M') => &[0, 1],
            (Alphabet::Dna, 'B') => &[1, 2, 3],
            (Alphabet::Dna, 'D') => &[0, 2, 3],
            (Alphabet::Dna, 'H') => &[0, 1, 3],
            (Alphabet::Dna, 'V') => &[0, 1, 2],
            (Alphabet::Dna, 'N' | 'X' | '-' | '?') => &[0, 1, 2, 3],

            (alphabet, other) => {
                return Err(Error::invalid_argument(
                    "symbol",
                    format!("'{}' is not a {:?} character", other, alphabet),
                ));
            }
        };
        let mut column = vec![0.0; self.number_of_states()];
        for &state in mask {
            column[state] = 1.0;
        }
        Ok(column)
    }
}

/// Aligned sequences as per-state partial likelihoods
#[derive(Clone, Debug)]
pub struct SiteContainer {
    states: usize,
    sites: Option<usize>,
    names: Vec<String>,
    positions: HashMap<String, usize>,
    data: Vec<Array2<f64>>,
}

impl SiteContainer {
    /// Empty container for `states`-state data
    pub fn new(states: usize) -> Self {
        Self {
            states,
            sites: None,
            names: Vec::new(),
            positions: HashMap::new(),
            data: Vec::new(),
        }
    }

    /// Build from `(name, sequence)` pairs read with `alphabet`
    pub fn from_sequences<'a>(
        alphabet: Alphabet,
        sequences: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self> {
        let mut container = Self::new(alphabet.number_of_states());
        for (name, sequence) in sequences {
            container.add_sequence(alphabet, name, sequence)?;
        }
        Ok(container)
    }

    /// Add a sequence of characters
    pub fn add_sequence(&mut self, alphabet: Alphabet, name: &str, sequence: &str) -> Result<()> {
        if alphabet.number_of_states() != self.states {
            return Err(Error::invalid_argument(
                "alphabet",
                format!(
                    "{:?} has {} states, container holds {}-state data",
                    alphabet,
                    alphabet.number_of_states(),
                    self.states
                ),
            ));
        }
        let symbols: Vec<char> = sequence.chars().filter(|c| !c.is_whitespace()).collect();
        let mut matrix = Array2::zeros((self.states, symbols.len()));
        for (site, &symbol) in symbols.iter().enumerate() {
            for (state, l) in alphabet.likelihoods(symbol)?.into_iter().enumerate() {
                matrix[[state, site]] = l;
            }
        }
        self.add_likelihoods(name, matrix)
    }

    /// Add a sequence given directly as a `states x sites` likelihood matrix
    pub fn add_likelihoods(&mut self, name: &str, likelihoods: Array2<f64>) -> Result<()> {
        if self.positions.contains_key(name) {
            return Err(Error::invalid_argument(
                "name",
                format!("duplicate sequence '{}'", name),
            ));
        }
        let sites = self.sites.unwrap_or(likelihoods.ncols());
        let expected = Dimension::conditional_likelihood(self.states, sites);
        let got = Dimension::matrix(likelihoods.nrows(), likelihoods.ncols());
        if expected != got {
            return Err(Error::dimension_mismatch(
                format!("sequence '{}'", name),
                expected,
                got,
            ));
        }
        self.sites = Some(sites);
        self.positions.insert(name.to_string(), self.names.len());
        self.names.push(name.to_string());
        self.data.push(likelihoods);
        Ok(())
    }

    /// Number of states per site
    #[inline]
    pub fn number_of_states(&self) -> usize {
        self.states
    }

    /// Number of sites (zero while empty)
    #[inline]
    pub fn number_of_sites(&self) -> usize {
        self.sites.unwrap_or(0)
    }

    /// Number of sequences
    #[inline]
    pub fn number_of_sequences(&self) -> usize {
        self.names.len()
    }

    /// Sequence names, in insertion order
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Row of a sequence
    pub fn sequence_position(&self, name: &str) -> Result<usize> {
        self.positions
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownSequence {
                name: name.to_string(),
            })
    }

    /// Partial likelihood of `state` at `site` in sequence `sequence`
    pub fn likelihood(&self, site: usize, sequence: usize, state: usize) -> Result<f64> {
        self.data
            .get(sequence)
            .and_then(|m| m.get([state, site]))
            .copied()
            .ok_or_else(|| {
                Error::invalid_argument(
                    "site",
                    format!(
                        "(site {}, sequence {}, state {}) out of range",
                        site, sequence, state
                    ),
                )
            })
    }

    /// `states x sites` likelihood matrix of a sequence
    pub fn sequence_likelihoods(&self, sequence: usize) -> Result<&Array2<f64>> {
        self.data.get(sequence).ok_or_else(|| {
            Error::invalid_argument("sequence", format!("no sequence at position {}", sequence))
        })
    }
}
