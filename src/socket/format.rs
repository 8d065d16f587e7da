//! Minimal printf/scanf engine.
//!
//! Conversions: `%d %i %u %x %X %o %f %c %s %p %%`, with optional `-`, `+`,
//! space and `0` flags, a field width, a precision and ignored length
//! modifiers (`h`, `l`, `z`, ...). Each numeric field is rendered into a
//! fixed-size stack buffer before it is emitted, so formatting never
//! allocates. Any other conversion character fails the call.

use crate::error::{VcpError, VcpResult};
use std::fmt::Write as _;

/// Size of the scratch buffer a single field is rendered into.
pub const FIELD_BUFFER_SIZE: usize = 64;

/// One argument to a `print` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Arg<'a> {
    Int(i64),
    Uint(u64),
    Float(f64),
    Char(char),
    Str(&'a str),
    Ptr(usize),
}

impl Arg<'_> {
    /// Pointer argument for `%p`.
    pub fn ptr<T: ?Sized>(p: *const T) -> Self {
        Arg::Ptr(p as *const () as usize)
    }
}

macro_rules! arg_from {
    ($variant:ident as $target:ty: $($t:ty),*) => {
        $(impl From<$t> for Arg<'_> {
            fn from(v: $t) -> Self {
                Arg::$variant(v as $target)
            }
        })*
    };
}

arg_from!(Int as i64: i8, i16, i32, i64, isize);
arg_from!(Uint as u64: u8, u16, u32, u64, usize);
arg_from!(Float as f64: f32, f64);

impl From<char> for Arg<'_> {
    fn from(c: char) -> Self {
        Arg::Char(c)
    }
}

impl<'a> From<&'a str> for Arg<'a> {
    fn from(s: &'a str) -> Self {
        Arg::Str(s)
    }
}

/// One destination of a `scanf` call.
#[derive(Debug)]
pub enum ScanArg<'a> {
    /// `%d` / `%i`
    Int(&'a mut i64),
    /// `%u` / `%x` / `%X`
    Uint(&'a mut u64),
    /// `%f`
    Float(&'a mut f64),
    /// `%c`
    Char(&'a mut char),
    /// `%s`
    Str(&'a mut String),
}

/// Byte input for [`scan_from`], with one byte of pushback.
pub trait ByteSource {
    fn next_byte(&mut self) -> VcpResult<u8>;
    fn unread(&mut self, byte: u8);
}

#[derive(Debug, Default, Clone, Copy)]
struct Spec {
    left: bool,
    plus: bool,
    space: bool,
    zero: bool,
    width: Option<usize>,
    precision: Option<usize>,
    conv: u8,
}

/// Parse the conversion that follows a `%`. Returns the spec and the number
/// of format bytes consumed.
fn parse_spec(rest: &[u8]) -> VcpResult<(Spec, usize)> {
    let mut spec = Spec::default();
    let mut i = 0;
    while let Some(&b) = rest.get(i) {
        match b {
            b'-' => spec.left = true,
            b'+' => spec.plus = true,
            b' ' => spec.space = true,
            b'0' => spec.zero = true,
            _ => break,
        }
        i += 1;
    }
    let (width, used) = parse_number(&rest[i..]);
    spec.width = width;
    i += used;
    if rest.get(i) == Some(&b'.') {
        i += 1;
        let (precision, used) = parse_number(&rest[i..]);
        spec.precision = Some(precision.unwrap_or(0));
        i += used;
    }
    while matches!(rest.get(i), Some(b'h' | b'l' | b'z' | b'j' | b't' | b'L')) {
        i += 1;
    }
    let conv = *rest
        .get(i)
        .ok_or(VcpError::InvalidArgs("format ends inside a conversion"))?;
    spec.conv = conv;
    Ok((spec, i + 1))
}

fn parse_number(bytes: &[u8]) -> (Option<usize>, usize) {
    let digits = bytes.iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return (None, 0);
    }
    let value = bytes[..digits]
        .iter()
        .fold(0usize, |acc, b| acc.saturating_mul(10).saturating_add((b - b'0') as usize));
    (Some(value), digits)
}

/// Fixed-capacity scratch buffer for one rendered field.
struct FieldBuf {
    bytes: [u8; FIELD_BUFFER_SIZE],
    len: usize,
}

impl FieldBuf {
    fn new() -> Self {
        Self {
            bytes: [0; FIELD_BUFFER_SIZE],
            len: 0,
        }
    }

    fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

impl std::fmt::Write for FieldBuf {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        let end = self.len + s.len();
        if end > FIELD_BUFFER_SIZE {
            return Err(std::fmt::Error);
        }
        self.bytes[self.len..end].copy_from_slice(s.as_bytes());
        self.len = end;
        Ok(())
    }
}

fn render(spec: &Spec, arg: Arg<'_>, buf: &mut FieldBuf) -> VcpResult<()> {
    let overflow = |_| VcpError::InvalidArgs("formatted field exceeds the field buffer");
    match (spec.conv, arg) {
        (b'd' | b'i', Arg::Int(v)) => {
            if v >= 0 && spec.plus {
                buf.write_char('+').map_err(overflow)?;
            } else if v >= 0 && spec.space {
                buf.write_char(' ').map_err(overflow)?;
            }
            write!(buf, "{v}").map_err(overflow)
        }
        (b'd' | b'i', Arg::Uint(v)) => write!(buf, "{}", v as i64).map_err(overflow),
        (b'd' | b'i', Arg::Char(c)) => write!(buf, "{}", c as u32).map_err(overflow),
        (b'u', Arg::Uint(v)) => write!(buf, "{v}").map_err(overflow),
        (b'u', Arg::Int(v)) => write!(buf, "{}", v as u64).map_err(overflow),
        (b'x', Arg::Uint(v)) => write!(buf, "{v:x}").map_err(overflow),
        (b'x', Arg::Int(v)) => write!(buf, "{:x}", v as u64).map_err(overflow),
        (b'X', Arg::Uint(v)) => write!(buf, "{v:X}").map_err(overflow),
        (b'X', Arg::Int(v)) => write!(buf, "{:X}", v as u64).map_err(overflow),
        (b'o', Arg::Uint(v)) => write!(buf, "{v:o}").map_err(overflow),
        (b'o', Arg::Int(v)) => write!(buf, "{:o}", v as u64).map_err(overflow),
        (b'f', Arg::Float(v)) => {
            let precision = spec.precision.unwrap_or(6);
            if v >= 0.0 && spec.plus {
                buf.write_char('+').map_err(overflow)?;
            }
            write!(buf, "{v:.precision$}").map_err(overflow)
        }
        (b'c', Arg::Char(c)) => buf.write_char(c).map_err(overflow),
        // Integers are Latin-1 code points.
        (b'c', Arg::Uint(v)) => buf.write_char(latin1(u8::try_from(v).ok())?).map_err(overflow),
        (b'c', Arg::Int(v)) => buf.write_char(latin1(u8::try_from(v).ok())?).map_err(overflow),
        (b'p', Arg::Ptr(p)) => write!(buf, "{p:#x}").map_err(overflow),
        (b'p', Arg::Uint(v)) => write!(buf, "{v:#x}").map_err(overflow),
        (b'd' | b'i' | b'u' | b'x' | b'X' | b'o' | b'f' | b'c' | b'p', _) => {
            Err(VcpError::InvalidArgs("argument type does not match conversion"))
        }
        _ => Err(VcpError::InvalidArgs("unsupported conversion specifier")),
    }
}

fn latin1(byte: Option<u8>) -> VcpResult<char> {
    byte.map(char::from)
        .ok_or(VcpError::InvalidArgs("%c argument is not a single byte"))
}

/// Emit `field` padded to the spec's width.
fn emit_padded(
    spec: &Spec,
    field: &[u8],
    sink: &mut dyn FnMut(u8) -> VcpResult<()>,
) -> VcpResult<usize> {
    let width = spec.width.unwrap_or(0);
    let pad = width.saturating_sub(field.len());
    let numeric = matches!(spec.conv, b'd' | b'i' | b'u' | b'x' | b'X' | b'o' | b'f' | b'p');
    let mut out = 0;

    if spec.left {
        for &b in field {
            sink(b)?;
        }
        for _ in 0..pad {
            sink(b' ')?;
        }
        return Ok(field.len() + pad);
    }

    if spec.zero && numeric {
        // Sign (and 0x prefix) stay in front of the zeros.
        let mut prefix = match field.first() {
            Some(b'-' | b'+' | b' ') => 1,
            _ => 0,
        };
        if spec.conv == b'p' && field.starts_with(b"0x") {
            prefix = 2;
        }
        for &b in &field[..prefix] {
            sink(b)?;
        }
        for _ in 0..pad {
            sink(b'0')?;
        }
        for &b in &field[prefix..] {
            sink(b)?;
        }
        return Ok(field.len() + pad);
    }

    for _ in 0..pad {
        sink(b' ')?;
        out += 1;
    }
    for &b in field {
        sink(b)?;
        out += 1;
    }
    Ok(out)
}

/// Format `fmt` with `args`, feeding every output byte to `sink`.
///
/// Returns the number of bytes emitted.
pub fn format_to(
    fmt: &str,
    args: &mut dyn Iterator<Item = Arg<'_>>,
    sink: &mut dyn FnMut(u8) -> VcpResult<()>,
) -> VcpResult<usize> {
    let bytes = fmt.as_bytes();
    let mut i = 0;
    let mut written = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b != b'%' {
            sink(b)?;
            written += 1;
            i += 1;
            continue;
        }
        let (spec, used) = parse_spec(&bytes[i + 1..])?;
        i += 1 + used;

        if spec.conv == b'%' {
            sink(b'%')?;
            written += 1;
            continue;
        }
        let arg = args
            .next()
            .ok_or(VcpError::InvalidArgs("too few arguments for format"))?;

        if spec.conv == b's' {
            let Arg::Str(s) = arg else {
                return Err(VcpError::InvalidArgs("argument type does not match conversion"));
            };
            let s = s.as_bytes();
            let s = match spec.precision {
                Some(p) => &s[..p.min(s.len())],
                None => s,
            };
            written += emit_padded(&spec, s, sink)?;
            continue;
        }

        let mut field = FieldBuf::new();
        render(&spec, arg, &mut field)?;
        written += emit_padded(&spec, field.as_bytes(), sink)?;
    }
    Ok(written)
}

fn skip_whitespace(source: &mut dyn ByteSource) -> VcpResult<u8> {
    loop {
        let b = source.next_byte()?;
        if !b.is_ascii_whitespace() {
            return Ok(b);
        }
    }
}

/// Collect bytes accepted by `accept` into a field buffer, starting with
/// `first`. The terminating byte is pushed back.
fn collect(
    first: u8,
    limit: usize,
    source: &mut dyn ByteSource,
    accept: impl Fn(u8, usize) -> bool,
) -> VcpResult<FieldBuf> {
    let mut field = FieldBuf::new();
    let mut b = first;
    while field.len < limit.min(FIELD_BUFFER_SIZE) && accept(b, field.len) {
        field.bytes[field.len] = b;
        field.len += 1;
        if field.len == limit {
            return Ok(field);
        }
        b = source.next_byte()?;
    }
    source.unread(b);
    Ok(field)
}

fn field_str(field: &FieldBuf) -> &str {
    // Only ASCII bytes are ever accepted into numeric fields.
    std::str::from_utf8(field.as_bytes()).unwrap_or("")
}

/// Parse input from `source` according to `fmt`, storing into `args`.
///
/// Returns the number of conversions assigned. Scanning stops early, without
/// error, at the first input byte that does not match.
pub fn scan_from(
    fmt: &str,
    args: &mut [ScanArg<'_>],
    source: &mut dyn ByteSource,
) -> VcpResult<usize> {
    let bytes = fmt.as_bytes();
    let mut next_arg = args.iter_mut();
    let mut assigned = 0;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if b.is_ascii_whitespace() {
            let first = skip_whitespace(source)?;
            source.unread(first);
            i += 1;
            continue;
        }
        if b != b'%' {
            let got = source.next_byte()?;
            if got != b {
                source.unread(got);
                return Ok(assigned);
            }
            i += 1;
            continue;
        }

        let (spec, used) = parse_spec(&bytes[i + 1..])?;
        i += 1 + used;
        let limit = spec.width.unwrap_or(usize::MAX);

        if spec.conv == b'%' {
            let got = skip_whitespace(source)?;
            if got != b'%' {
                source.unread(got);
                return Ok(assigned);
            }
            continue;
        }
        if !matches!(spec.conv, b'd' | b'i' | b'u' | b'x' | b'X' | b'f' | b'c' | b's') {
            return Err(VcpError::InvalidArgs("unsupported conversion specifier"));
        }
        let target = next_arg
            .next()
            .ok_or(VcpError::InvalidArgs("too few arguments for format"))?;

        match (spec.conv, target) {
            (b'c', ScanArg::Char(out)) => {
                **out = source.next_byte()? as char;
            }
            (b's', ScanArg::Str(out)) => {
                out.clear();
                let mut b = skip_whitespace(source)?;
                let mut taken = 0;
                while !b.is_ascii_whitespace() {
                    out.push(b as char);
                    taken += 1;
                    if taken == limit {
                        break;
                    }
                    b = source.next_byte()?;
                }
                if taken < limit {
                    source.unread(b);
                }
            }
            (b'd' | b'i', ScanArg::Int(out)) => {
                let first = skip_whitespace(source)?;
                let field = collect(first, limit, source, |b, at| {
                    b.is_ascii_digit() || (at == 0 && (b == b'-' || b == b'+'))
                })?;
                match field_str(&field).parse::<i64>() {
                    Ok(v) => **out = v,
                    Err(_) => return Ok(assigned),
                }
            }
            (b'u', ScanArg::Uint(out)) => {
                let first = skip_whitespace(source)?;
                let field = collect(first, limit, source, |b, at| {
                    b.is_ascii_digit() || (at == 0 && b == b'+')
                })?;
                match field_str(&field).parse::<u64>() {
                    Ok(v) => **out = v,
                    Err(_) => return Ok(assigned),
                }
            }
            (b'x' | b'X', ScanArg::Uint(out)) => {
                let first = skip_whitespace(source)?;
                let field = collect(first, limit, source, |b, _| b.is_ascii_hexdigit())?;
                match u64::from_str_radix(field_str(&field), 16) {
                    Ok(v) => **out = v,
                    Err(_) => return Ok(assigned),
                }
            }
            (b'f', ScanArg::Float(out)) => {
                let first = skip_whitespace(source)?;
                let field = collect(first, limit, source, |b, at| {
                    b.is_ascii_digit() || b == b'.' || (at == 0 && (b == b'-' || b == b'+'))
                })?;
                match field_str(&field).parse::<f64>() {
                    Ok(v) => **out = v,
                    Err(_) => return Ok(assigned),
                }
            }
            _ => return Err(VcpError::InvalidArgs("argument type does not match conversion")),
        }
        assigned += 1;
    }
    Ok(assigned)
}
