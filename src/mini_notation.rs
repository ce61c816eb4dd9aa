//! Mini-notation: the compact textual sub-language for repeating value
//! sequences.
//!
//! A program is `|`-separated bars, each compiled to a fixed array of
//! slots. Lookup folds the tick into the bar array and indexes the slot.
//! Programs are compiled once per distinct source string and cached for
//! the life of the process; choice (`?`) draws are frozen into the
//! compiled program, seeded from a hash of the source text so that
//! identical strings always share draws.
//!
//! Grammar sketch:
//!
//! ```text
//! 1 2 3        one slot per value
//! 1*4   2--    repeat / hold
//! ^1011        binary digits, one slot each
//! 3:8          euclidean pulses over slots
//! 0..3         integer range, one slot per step
//! 1?0*16       per-slot random choice
//! 0,3,7*6      alternation by slot index
//! (1 2)*2      group, repeated as a whole
//! [60 64 67]   chord: one list-valued slot
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rand::{rngs::StdRng, Rng, SeedableRng};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::pattern::Value;
use crate::position::normalized_position;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Binary(String),
    Dash,
    Star,
    Question,
    Comma,
    Colon,
    DotDot,
    Pipe,
    OpenParen,
    CloseParen,
    OpenBracket,
    CloseBracket,
}

/// A compiled program: bars of slots, each slot one value or a chord.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    bars: Vec<Vec<Value>>,
}

impl Program {
    pub fn bar_count(&self) -> usize {
        self.bars.len()
    }

    pub fn bars(&self) -> &[Vec<Value>] {
        &self.bars
    }

    /// Look up the slot for a tick: the position folds over the bar count,
    /// the integer part picks the bar and the fraction picks the beat.
    pub fn lookup(&self, tick: f64, divisions: f64) -> Value {
        if self.bars.is_empty() {
            return Value::Empty;
        }
        let pos = normalized_position(tick, divisions, 1.0, self.bars.len() as f64);
        let bar = (pos.floor() as usize).min(self.bars.len() - 1);
        let slots = &self.bars[bar];
        if slots.is_empty() {
            return Value::Empty;
        }
        let beat = (((pos - pos.floor()) * slots.len() as f64) as usize).min(slots.len() - 1);
        slots[beat].clone()
    }
}

lazy_static::lazy_static! {
    static ref PROGRAM_CACHE: Mutex<HashMap<String, Arc<Program>>> = Mutex::new(HashMap::new());
}

/// Compile a source string, reusing the process-wide cache. Failures are
/// reported to the caller and never cached.
pub fn compile(source: &str) -> Result<Arc<Program>, String> {
    if let Ok(cache) = PROGRAM_CACHE.lock() {
        if let Some(program) = cache.get(source) {
            return Ok(program.clone());
        }
    }
    let program = Arc::new(parse_program(source)?);
    debug!(
        "compiled mini-notation '{}' ({} bars)",
        source,
        program.bar_count()
    );
    if let Ok(mut cache) = PROGRAM_CACHE.lock() {
        cache.insert(source.to_string(), program.clone());
    }
    Ok(program)
}

/// Compile (through the cache) and look up in one step.
pub fn query(source: &str, tick: f64, divisions: f64) -> Result<Value, String> {
    compile(source).map(|program| program.lookup(tick, divisions))
}

fn text_seed(source: &str) -> u64 {
    let digest = Sha256::digest(source.as_bytes());
    digest
        .iter()
        .take(8)
        .fold(0u64, |acc, b| (acc << 8) | u64::from(*b))
}

fn parse_program(source: &str) -> Result<Program, String> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err("empty program".to_string());
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        rng: StdRng::seed_from_u64(text_seed(source)),
    };
    let mut bars = vec![parser.parse_bar()?];
    while matches!(parser.current(), Some(Token::Pipe)) {
        parser.advance();
        bars.push(parser.parse_bar()?);
    }
    if let Some(tok) = parser.current() {
        return Err(format!("unexpected {:?} after bar", tok));
    }
    Ok(Program { bars })
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    // true directly after a value, with no whitespace since: a '-' there
    // is a hold dash, not a negative sign
    let mut glued = false;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            glued = false;
            i += 1;
            continue;
        }
        match c {
            '|' => {
                tokens.push(Token::Pipe);
                glued = false;
                i += 1;
            }
            '(' => {
                tokens.push(Token::OpenParen);
                glued = false;
                i += 1;
            }
            ')' => {
                tokens.push(Token::CloseParen);
                glued = true;
                i += 1;
            }
            '[' => {
                tokens.push(Token::OpenBracket);
                glued = false;
                i += 1;
            }
            ']' => {
                tokens.push(Token::CloseBracket);
                glued = true;
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                glued = false;
                i += 1;
            }
            '?' => {
                tokens.push(Token::Question);
                glued = false;
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                glued = false;
                i += 1;
            }
            ':' => {
                tokens.push(Token::Colon);
                glued = false;
                i += 1;
            }
            '.' => {
                if chars.get(i + 1) == Some(&'.') {
                    tokens.push(Token::DotDot);
                    glued = false;
                    i += 2;
                } else {
                    return Err("single '.' outside a number".to_string());
                }
            }
            '^' => {
                let mut digits = String::new();
                i += 1;
                while let Some(d) = chars.get(i) {
                    if *d == '0' || *d == '1' {
                        digits.push(*d);
                        i += 1;
                    } else {
                        break;
                    }
                }
                if digits.is_empty() {
                    return Err("'^' must be followed by binary digits".to_string());
                }
                tokens.push(Token::Binary(digits));
                glued = true;
            }
            '-' => {
                if glued {
                    tokens.push(Token::Dash);
                    i += 1;
                } else if chars.get(i + 1).map(|d| d.is_ascii_digit()).unwrap_or(false) {
                    let n = read_number(&chars, &mut i)?;
                    tokens.push(Token::Number(n));
                    glued = true;
                } else {
                    return Err("stray '-'".to_string());
                }
            }
            '0'..='9' => {
                let n = read_number(&chars, &mut i)?;
                tokens.push(Token::Number(n));
                glued = true;
            }
            other => return Err(format!("unexpected character '{}'", other)),
        }
    }
    Ok(tokens)
}

fn read_number(chars: &[char], i: &mut usize) -> Result<f64, String> {
    let start = *i;
    let mut text = String::new();
    if chars.get(*i) == Some(&'-') {
        text.push('-');
        *i += 1;
    }
    let mut seen_dot = false;
    while let Some(c) = chars.get(*i) {
        if c.is_ascii_digit() {
            text.push(*c);
            *i += 1;
        } else if *c == '.' && !seen_dot {
            // two dots form a range operator, not a decimal point
            if chars.get(*i + 1) == Some(&'.') {
                break;
            }
            seen_dot = true;
            text.push(*c);
            *i += 1;
        } else {
            break;
        }
    }
    text.parse::<f64>()
        .map_err(|_| format!("bad number at offset {}", start))
}

/// What one event parses to, before expansion into slots.
enum Parsed {
    Scalar {
        items: Vec<f64>,
        mode: ScalarMode,
        dur: usize,
    },
    Block(Vec<Value>),
}

enum ScalarMode {
    Single,
    Choice,
    Alternate,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    rng: StdRng,
}

impl Parser {
    fn current(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn expect_number(&mut self, what: &str) -> Result<f64, String> {
        match self.current() {
            Some(Token::Number(n)) => {
                let n = *n;
                self.advance();
                Ok(n)
            }
            other => Err(format!("expected {} but found {:?}", what, other)),
        }
    }

    fn expect_count(&mut self, what: &str) -> Result<usize, String> {
        let n = self.expect_number(what)?;
        if n < 1.0 || n.fract() != 0.0 {
            return Err(format!("{} must be a positive integer", what));
        }
        Ok(n as usize)
    }

    fn parse_bar(&mut self) -> Result<Vec<Value>, String> {
        let mut slots = Vec::new();
        while let Some(tok) = self.current() {
            if matches!(tok, Token::Pipe) {
                break;
            }
            slots.extend(self.parse_event()?);
        }
        if slots.is_empty() {
            return Err("empty bar".to_string());
        }
        Ok(slots)
    }

    fn parse_event(&mut self) -> Result<Vec<Value>, String> {
        let mut parsed = self.parse_primary()?;

        loop {
            match self.current() {
                Some(Token::Star) => {
                    self.advance();
                    let count = self.expect_count("repeat count")?;
                    match &mut parsed {
                        Parsed::Scalar { dur, .. } => *dur = count,
                        Parsed::Block(slots) => {
                            let once = slots.clone();
                            for _ in 1..count {
                                slots.extend(once.iter().cloned());
                            }
                        }
                    }
                }
                Some(Token::Dash) => {
                    let mut held = 0;
                    while matches!(self.current(), Some(Token::Dash)) {
                        self.advance();
                        held += 1;
                    }
                    match &mut parsed {
                        Parsed::Scalar { dur, .. } => *dur += held,
                        Parsed::Block(slots) => {
                            if let Some(last) = slots.last().cloned() {
                                for _ in 0..held {
                                    slots.push(last.clone());
                                }
                            }
                        }
                    }
                }
                _ => break,
            }
        }

        Ok(match parsed {
            Parsed::Scalar { items, mode, dur } => match mode {
                ScalarMode::Single => vec![Value::Num(items[0]); dur],
                ScalarMode::Choice => (0..dur)
                    .map(|_| Value::Num(items[self.rng.gen_range(0..items.len())]))
                    .collect(),
                ScalarMode::Alternate => (0..dur)
                    .map(|i| Value::Num(items[i % items.len()]))
                    .collect(),
            },
            Parsed::Block(slots) => slots,
        })
    }

    fn parse_primary(&mut self) -> Result<Parsed, String> {
        match self.current() {
            Some(Token::Number(n)) => {
                let n = *n;
                self.advance();
                match self.current() {
                    Some(Token::Colon) => {
                        self.advance();
                        if n < 0.0 || n.fract() != 0.0 {
                            return Err("euclidean pulses must be a non-negative integer".into());
                        }
                        let steps = self.expect_count("euclidean steps")?;
                        Ok(Parsed::Block(euclid(n as usize, steps)))
                    }
                    Some(Token::DotDot) => {
                        self.advance();
                        let to = self.expect_number("range end")?;
                        Ok(Parsed::Block(integer_range(n, to)))
                    }
                    Some(Token::Question) => {
                        let mut items = vec![n];
                        while matches!(self.current(), Some(Token::Question)) {
                            self.advance();
                            items.push(self.expect_number("choice value")?);
                        }
                        Ok(Parsed::Scalar {
                            items,
                            mode: ScalarMode::Choice,
                            dur: 1,
                        })
                    }
                    Some(Token::Comma) => {
                        let mut items = vec![n];
                        while matches!(self.current(), Some(Token::Comma)) {
                            self.advance();
                            items.push(self.expect_number("alternation value")?);
                        }
                        Ok(Parsed::Scalar {
                            items,
                            mode: ScalarMode::Alternate,
                            dur: 1,
                        })
                    }
                    _ => Ok(Parsed::Scalar {
                        items: vec![n],
                        mode: ScalarMode::Single,
                        dur: 1,
                    }),
                }
            }
            Some(Token::Binary(digits)) => {
                let slots = digits
                    .chars()
                    .map(|d| Value::Num(if d == '1' { 1.0 } else { 0.0 }))
                    .collect();
                self.advance();
                Ok(Parsed::Block(slots))
            }
            Some(Token::OpenParen) => {
                self.advance();
                let mut slots = Vec::new();
                loop {
                    match self.current() {
                        Some(Token::CloseParen) => {
                            self.advance();
                            break;
                        }
                        None => return Err("unclosed '('".to_string()),
                        Some(Token::Pipe) => return Err("'|' inside a group".to_string()),
                        _ => slots.extend(self.parse_event()?),
                    }
                }
                if slots.is_empty() {
                    return Err("empty group".to_string());
                }
                Ok(Parsed::Block(slots))
            }
            Some(Token::OpenBracket) => {
                self.advance();
                let mut voices = Vec::new();
                loop {
                    match self.current() {
                        Some(Token::CloseBracket) => {
                            self.advance();
                            break;
                        }
                        Some(Token::Number(n)) => {
                            voices.push(*n);
                            self.advance();
                        }
                        None => return Err("unclosed '['".to_string()),
                        other => return Err(format!("expected number in array, found {:?}", other)),
                    }
                }
                if voices.is_empty() {
                    return Err("empty array".to_string());
                }
                Ok(Parsed::Block(vec![Value::from_list(voices)]))
            }
            other => Err(format!("unexpected {:?}", other)),
        }
    }
}

/// Distribute `pulses` over `steps` as evenly as possible.
fn euclid(pulses: usize, steps: usize) -> Vec<Value> {
    (0..steps)
        .map(|i| Value::Num(if (i * pulses) % steps < pulses { 1.0 } else { 0.0 }))
        .collect()
}

/// One slot per integer from `from` to `to` inclusive, either direction.
fn integer_range(from: f64, to: f64) -> Vec<Value> {
    let a = from.round() as i64;
    let b = to.round() as i64;
    if a <= b {
        (a..=b).map(|n| Value::Num(n as f64)).collect()
    } else {
        (b..=a).rev().map(|n| Value::Num(n as f64)).collect()
    }
}
