//! Token source over busconfig XML text.
//!
//! Flattens quick-xml's element events into the attribute-level token
//! stream the compiler consumes. Comments, processing instructions, the
//! XML declaration and the DOCTYPE never reach the compiler.

use buspolicy_core::{CoreError, CoreResult, Token, TokenKind, TokenSource};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::VecDeque;

pub struct XmlTokenSource<'a> {
    reader: Reader<&'a [u8]>,
    text: &'a str,
    pending: VecDeque<Token>,
    line: u32,
    scanned: usize,
    finished: bool,
}

impl<'a> XmlTokenSource<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            reader: Reader::from_str(text),
            text,
            pending: VecDeque::new(),
            line: 1,
            scanned: 0,
            finished: false,
        }
    }

    /// Line number at byte `offset`, counting forward from the last query.
    fn line_at(&mut self, offset: usize) -> u32 {
        let end = offset.min(self.text.len());
        if end > self.scanned {
            let newlines = self.text.as_bytes()[self.scanned..end]
                .iter()
                .filter(|b| **b == b'\n')
                .count();
            self.line += newlines as u32;
            self.scanned = end;
        }
        self.line
    }

    fn lexical(line: u32, cause: impl ToString) -> CoreError {
        CoreError::Lexical {
            line,
            cause: cause.to_string(),
        }
    }

    /// Queue the tokens for the next significant event.
    fn fill(&mut self) -> CoreResult<()> {
        loop {
            let start = self.reader.buffer_position() as usize;
            let line = self.line_at(start);
            let event = self
                .reader
                .read_event()
                .map_err(|e| Self::lexical(line, e))?;

            match event {
                Event::Start(element) => {
                    self.push_open(&element, line)?;
                    return Ok(());
                }
                Event::Empty(element) => {
                    let name = self.push_open(&element, line)?;
                    self.pending
                        .push_back(Token::new(TokenKind::TagCloseEmpty(name), line));
                    return Ok(());
                }
                Event::End(element) => {
                    let name = decode_name(element.name().as_ref(), line)?;
                    self.pending
                        .push_back(Token::new(TokenKind::TagClose(name), line));
                    return Ok(());
                }
                Event::Text(text) => {
                    let content = text.unescape().map_err(|e| Self::lexical(line, e))?;
                    self.pending
                        .push_back(Token::new(TokenKind::Text(content.into_owned()), line));
                    return Ok(());
                }
                Event::CData(data) => {
                    let content = String::from_utf8_lossy(&data).into_owned();
                    self.pending
                        .push_back(Token::new(TokenKind::Text(content), line));
                    return Ok(());
                }
                Event::Eof => {
                    self.finished = true;
                    return Ok(());
                }
                Event::Comment(_) | Event::Decl(_) | Event::PI(_) | Event::DocType(_) => {}
            }
        }
    }

    /// Queue `TagOpen` plus one name/value pair per attribute. Returns the
    /// element name.
    fn push_open(&mut self, element: &BytesStart<'_>, line: u32) -> CoreResult<String> {
        let name = decode_name(element.name().as_ref(), line)?;
        self.pending
            .push_back(Token::new(TokenKind::TagOpen(name.clone()), line));

        // Repeated attributes must reach the compiler so it can reject them
        // as duplicates with its own diagnostics.
        for attribute in element.attributes().with_checks(false) {
            let attribute = attribute.map_err(|e| Self::lexical(line, e))?;
            let key = decode_name(attribute.key.as_ref(), line)?;
            let value = attribute
                .unescape_value()
                .map_err(|e| Self::lexical(line, e))?;
            self.pending
                .push_back(Token::new(TokenKind::AttributeName(key), line));
            self.pending
                .push_back(Token::new(TokenKind::AttributeValue(value.into_owned()), line));
        }
        Ok(name)
    }
}

fn decode_name(raw: &[u8], line: u32) -> CoreResult<String> {
    std::str::from_utf8(raw)
        .map(str::to_string)
        .map_err(|e| XmlTokenSource::lexical(line, e))
}

impl TokenSource for XmlTokenSource<'_> {
    fn next_token(&mut self) -> CoreResult<Token> {
        while self.pending.is_empty() && !self.finished {
            self.fill()?;
        }
        match self.pending.pop_front() {
            Some(token) => Ok(token),
            None => Ok(Token::new(TokenKind::End, self.line)),
        }
    }
}
