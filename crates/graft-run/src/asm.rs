//! Assembler for `.gasm` unit files.
//!
//! Tokenizes with logos, then parses by hand with single-token lookahead.
//! A file is a sequence of unit declarations:
//!
//! ```text
//! ; sums a pair
//! unit adder(x, y) {
//!     load x
//!     load y
//!     add
//!     ret
//! }
//! ```
//!
//! A leading `@name` parameter marks the receiver. Branch targets are named
//! labels, interned to `u16` ids in order of first appearance within a unit.

use graft_bytecode::{CodeUnit, Instr, InstructionStream, Op, SourceLoc, Value};
use indexmap::IndexMap;
use logos::Logos;
use std::mem;
use std::ops::Range;
use std::path::PathBuf;

/// Token type for `.gasm` source.
///
/// Mnemonics are ordinary identifiers; the parser resolves them by position,
/// so only structural words need their own token.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r";[^\n]*")]
pub enum Token<'src> {
    #[token("unit")]
    Unit,
    #[token("true")]
    True,
    #[token("false")]
    False,

    #[token("@")]
    At,
    #[token("(")]
    ParenOpen,
    #[token(")")]
    ParenClose,
    #[token("{")]
    BraceOpen,
    #[token("}")]
    BraceClose,
    #[token(",")]
    Comma,

    /// Integer literal (may have sign). Parsed later so overflow reports
    /// the offending text instead of a generic lex error.
    #[regex(r"-?[0-9]+", |lex| lex.slice())]
    Int(&'src str),

    /// String literal with the quotes stripped; escapes resolved by the parser.
    #[regex(r#""([^"\\]|\\.)*""#, |lex| {
        let s = lex.slice();
        &s[1..s.len()-1]
    })]
    Str(&'src str),

    /// Identifier: mnemonics, unit names, locals, globals, labels.
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice())]
    Ident(&'src str),
}

/// Errors surfaced while assembling `.gasm` text.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AsmError {
    /// A token that does not fit the grammar at this point.
    #[error("Unexpected {found} at line {line}: expected {expected}")]
    UnexpectedToken {
        /// Description of what was found, e.g. `token '{'` or `end of file`.
        found: String,
        /// What the parser was looking for.
        expected: &'static str,
        /// 1-based source line.
        line: u32,
    },

    /// A statement head that names no known instruction.
    #[error("Unknown mnemonic '{name}' at line {line}")]
    UnknownMnemonic {
        /// The unrecognized word.
        name: String,
        /// 1-based source line.
        line: u32,
    },

    /// A branch target never defined by a `label` statement in its unit.
    #[error("Undefined label '{name}'")]
    UndefinedLabel {
        /// The missing label.
        name: String,
    },

    /// A label defined more than once in the same unit.
    #[error("Duplicate label '{name}' at line {line}")]
    DuplicateLabel {
        /// The redefined label.
        name: String,
        /// 1-based line of the second definition.
        line: u32,
    },

    /// A literal or argument count outside its value range.
    #[error("Bad literal '{text}' at line {line}")]
    BadLiteral {
        /// The offending source text.
        text: String,
        /// 1-based source line.
        line: u32,
    },

    /// Input the lexer could not tokenize at all.
    #[error("Unrecognized token at line {line}")]
    Lex {
        /// 1-based source line.
        line: u32,
    },
}

/// Assemble `.gasm` text into code units.
///
/// Each unit's `path` is the source path handed in; instruction positions
/// are the end of each statement's last token.
///
/// # Errors
///
/// Returns [`AsmError`] on the first malformed token or statement.
pub fn assemble(path: impl Into<PathBuf>, text: &str) -> Result<Vec<CodeUnit>, AsmError> {
    let lines = LineMap::new(text);
    let mut lexer = Token::lexer(text);
    let mut tokens = Vec::new();
    while let Some(result) = lexer.next() {
        match result {
            Ok(token) => tokens.push((token, lexer.span())),
            Err(()) => {
                return Err(AsmError::Lex {
                    line: lines.line(lexer.span().start),
                });
            }
        }
    }

    let mut asm = Asm {
        tokens,
        pos: 0,
        lines,
        path: path.into(),
    };
    let mut units = Vec::new();
    while !asm.at_end() {
        units.push(asm.unit()?);
    }
    Ok(units)
}

/// Byte offset to 1-based line/column mapping.
struct LineMap {
    starts: Vec<u32>,
}

impl LineMap {
    fn new(text: &str) -> Self {
        let mut starts = vec![0u32];
        for (i, byte) in text.bytes().enumerate() {
            if byte == b'\n' {
                starts.push(i as u32 + 1);
            }
        }
        Self { starts }
    }

    fn loc(&self, offset: usize) -> SourceLoc {
        let offset = offset as u32;
        let line_idx = match self.starts.binary_search(&offset) {
            Ok(idx) => idx,
            Err(idx) => idx - 1,
        };
        SourceLoc::new(line_idx as u32 + 1, offset - self.starts[line_idx] + 1)
    }

    fn line(&self, offset: usize) -> u32 {
        self.loc(offset).line
    }

    fn eof_line(&self) -> u32 {
        self.starts.len() as u32
    }
}

/// Recursive descent parser over the token stream.
struct Asm<'src> {
    tokens: Vec<(Token<'src>, Range<usize>)>,
    pos: usize,
    lines: LineMap,
    path: PathBuf,
}

impl<'src> Asm<'src> {
    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token<'src>> {
        self.tokens.get(self.pos).map(|(tok, _)| tok)
    }

    fn check(&self, expected: &Token<'src>) -> bool {
        matches!(self.peek(), Some(t) if mem::discriminant(t) == mem::discriminant(expected))
    }

    fn eat(&mut self, expected: &Token<'src>) -> bool {
        if self.check(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token<'src>, what: &'static str) -> Result<(), AsmError> {
        if self.eat(&expected) {
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn expect_ident(&mut self, what: &'static str) -> Result<String, AsmError> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = name.to_string();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    /// 1-based line of the token at the cursor, or of end of input.
    fn current_line(&self) -> u32 {
        match self.tokens.get(self.pos) {
            Some((_, span)) => self.lines.line(span.start),
            None => self.lines.eof_line(),
        }
    }

    fn unexpected(&self, expected: &'static str) -> AsmError {
        let found = match self.peek() {
            Some(token) => describe(token),
            None => "end of file".to_string(),
        };
        AsmError::UnexpectedToken {
            found,
            expected,
            line: self.current_line(),
        }
    }

    fn unit(&mut self) -> Result<CodeUnit, AsmError> {
        self.expect(Token::Unit, "'unit'")?;
        let name = self.expect_ident("a unit name")?;
        self.expect(Token::ParenOpen, "'('")?;

        let mut receiver = None;
        let mut params = Vec::new();
        if !self.check(&Token::ParenClose) {
            if self.eat(&Token::At) {
                receiver = Some(self.expect_ident("a receiver name")?);
            } else {
                params.push(self.expect_ident("a parameter name")?);
            }
            while self.eat(&Token::Comma) {
                params.push(self.expect_ident("a parameter name")?);
            }
        }
        self.expect(Token::ParenClose, "')'")?;
        self.expect(Token::BraceOpen, "'{'")?;

        let param_refs: Vec<&str> = params.iter().map(String::as_str).collect();
        let mut unit = match &receiver {
            Some(recv) => CodeUnit::method(&name, self.path.clone(), recv, &param_refs),
            None => CodeUnit::function(&name, self.path.clone(), &param_refs),
        };

        // Label name -> defined flag; position in the map is the label id.
        let mut labels: IndexMap<String, bool> = IndexMap::new();
        while !self.at_end() && !self.check(&Token::BraceClose) {
            self.statement(&mut unit.stream, &mut labels)?;
        }
        self.expect(Token::BraceClose, "'}'")?;

        if let Some((label, _)) = labels.iter().find(|(_, defined)| !**defined) {
            return Err(AsmError::UndefinedLabel {
                name: label.clone(),
            });
        }
        Ok(unit)
    }

    fn statement(
        &mut self,
        stream: &mut InstructionStream,
        labels: &mut IndexMap<String, bool>,
    ) -> Result<(), AsmError> {
        let line = self.current_line();
        let mnemonic = match self.peek() {
            Some(Token::Ident(name)) => {
                let name = *name;
                self.pos += 1;
                name
            }
            _ => return Err(self.unexpected("a mnemonic")),
        };

        let op = match mnemonic {
            "const" => Op::Const(stream.add_const(self.literal(line)?)),
            "load" => Op::LoadLocal(stream.add_local(&self.expect_ident("a local name")?)),
            "store" => Op::StoreLocal(stream.add_local(&self.expect_ident("a local name")?)),
            "global" => Op::LoadGlobal(stream.add_global(&self.expect_ident("a global name")?)),
            "call" => Op::Call {
                arity: self.arity(line)?,
            },
            "jump" => Op::Jump(label_id(labels, &self.expect_ident("a label name")?)),
            "jumpf" => Op::JumpIfFalse(label_id(labels, &self.expect_ident("a label name")?)),
            "label" => {
                let name = self.expect_ident("a label name")?;
                let id = label_id(labels, &name);
                let defined = &mut labels[id as usize];
                if *defined {
                    return Err(AsmError::DuplicateLabel { name, line });
                }
                *defined = true;
                Op::Label(id)
            }
            "add" => Op::Add,
            "sub" => Op::Sub,
            "mul" => Op::Mul,
            "eq" => Op::Eq,
            "lt" => Op::Lt,
            "dup" => Op::Dup,
            "pop" => Op::Pop,
            "ret" => Op::Return,
            _ => {
                return Err(AsmError::UnknownMnemonic {
                    name: mnemonic.to_string(),
                    line,
                });
            }
        };

        let end = self.tokens[self.pos - 1].1.end;
        stream.push(Instr::new(op, self.lines.loc(end)));
        Ok(())
    }

    fn literal(&mut self, line: u32) -> Result<Value, AsmError> {
        let value = match self.peek() {
            Some(Token::Int(text)) => {
                let text = *text;
                match text.parse::<i64>() {
                    Ok(v) => Value::Int(v),
                    Err(_) => {
                        return Err(AsmError::BadLiteral {
                            text: text.to_string(),
                            line,
                        });
                    }
                }
            }
            Some(Token::Str(text)) => {
                let text = *text;
                match unescape(text) {
                    Some(s) => Value::Text(s),
                    None => {
                        return Err(AsmError::BadLiteral {
                            text: text.to_string(),
                            line,
                        });
                    }
                }
            }
            Some(Token::True) => Value::Bool(true),
            Some(Token::False) => Value::Bool(false),
            _ => return Err(self.unexpected("a literal")),
        };
        self.pos += 1;
        Ok(value)
    }

    fn arity(&mut self, line: u32) -> Result<u8, AsmError> {
        match self.peek() {
            Some(Token::Int(text)) => {
                let text = *text;
                match text.parse::<u8>() {
                    Ok(arity) => {
                        self.pos += 1;
                        Ok(arity)
                    }
                    Err(_) => Err(AsmError::BadLiteral {
                        text: text.to_string(),
                        line,
                    }),
                }
            }
            _ => Err(self.unexpected("an argument count")),
        }
    }
}

/// Intern a label name, handing out ids in order of first appearance.
fn label_id(labels: &mut IndexMap<String, bool>, name: &str) -> u16 {
    match labels.get_index_of(name) {
        Some(idx) => idx as u16,
        None => {
            let (idx, _) = labels.insert_full(name.to_string(), false);
            idx as u16
        }
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Unit => "token 'unit'".to_string(),
        Token::True => "token 'true'".to_string(),
        Token::False => "token 'false'".to_string(),
        Token::At => "token '@'".to_string(),
        Token::ParenOpen => "token '('".to_string(),
        Token::ParenClose => "token ')'".to_string(),
        Token::BraceOpen => "token '{'".to_string(),
        Token::BraceClose => "token '}'".to_string(),
        Token::Comma => "token ','".to_string(),
        Token::Int(s) | Token::Ident(s) => format!("token '{s}'"),
        Token::Str(s) => format!("string \"{s}\""),
    }
}

/// Resolve string escapes. `None` on an unsupported sequence.
fn unescape(text: &str) -> Option<String> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('\\') => out.push('\\'),
                Some('"') => out.push('"'),
                _ => return None,
            }
        } else {
            out.push(c);
        }
    }
    Some(out)
}
