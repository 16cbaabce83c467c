//! HSSB bytecode module container.
//!
//! Layout: `"HSSB"`, `u16` version, `u16` reserved, `u32` flags, then tagged sections
//! `[tag:4][len:u32][payload]`. All integers are little-endian.
//!
//! | tag    | payload                                                      |
//! |--------|--------------------------------------------------------------|
//! | `CODE` | instruction bytes                                            |
//! | `NATV` | `u16` count, then per native: `u16`-length-prefixed name,   |
//! |        | `u8` arity, one type tag per param, return tag (`0`: none)  |
//! | `RSLT` | one byte result type tag (section absent: no result)         |
//! | `META` | JSON encoded [`ModuleMeta`]                                  |
//!
//! Unknown sections are skipped.

use std::collections::BTreeMap;

use anyhow::{Context, Result, anyhow, bail, ensure};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::bytecode::disassemble;
use super::compiler::CompiledProgram;
use super::native::{NativeImport, NativeSignature};
use super::scalar::ValueType;

const MAGIC: [u8; 4] = *b"HSSB";
pub const CURRENT_VERSION: u16 = 1;

/// Optional description of where a module came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleMeta {
    /// Source path or identifier.
    pub source: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl ModuleMeta {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.source.is_none() && self.tags.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HssbModule {
    pub version: u16,
    pub flags: u32,
    pub program: CompiledProgram,
    pub meta: Option<ModuleMeta>,
}

impl HssbModule {
    pub fn new(program: CompiledProgram) -> Self {
        Self {
            version: CURRENT_VERSION,
            flags: 0,
            program,
            meta: None,
        }
    }

    pub fn with_meta(mut self, meta: ModuleMeta) -> Self {
        self.meta = Some(meta);
        self
    }
}

pub fn encode_module(module: &HssbModule) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(module.program.code.len() + 32);
    out.extend_from_slice(&MAGIC);
    write_u16(&mut out, module.version);
    write_u16(&mut out, 0); // reserved
    write_u32(&mut out, module.flags);

    write_section(&mut out, *b"CODE", &module.program.code)?;

    if !module.program.natives.is_empty() {
        let count = u16::try_from(module.program.natives.len()).context("too many natives")?;
        let mut payload = Vec::new();
        write_u16(&mut payload, count);
        for import in &module.program.natives {
            write_native(&mut payload, import)?;
        }
        write_section(&mut out, *b"NATV", &payload)?;
    }

    if let Some(ty) = module.program.result {
        write_section(&mut out, *b"RSLT", &[ty.tag()])?;
    }

    if let Some(meta) = module.meta.as_ref().filter(|m| !m.is_empty()) {
        let payload = serde_json::to_vec(meta)?;
        write_section(&mut out, *b"META", &payload)?;
    }

    debug!(target: "hss::hssb", bytes = out.len(), code_bytes = module.program.code.len(), "hssb.encode");
    Ok(out)
}

pub fn decode_module(bytes: &[u8]) -> Result<HssbModule> {
    ensure!(bytes.len() >= 12, "module too small");
    ensure!(bytes[..4] == MAGIC, "invalid HSSB magic");

    let mut cursor = 4;
    let version = read_u16(bytes, &mut cursor)?;
    let _reserved = read_u16(bytes, &mut cursor)?;
    let flags = read_u32(bytes, &mut cursor)?;
    ensure!(
        version <= CURRENT_VERSION,
        "unsupported HSSB version {} (reader supports <= {})",
        version,
        CURRENT_VERSION
    );

    let mut code: Option<Vec<u8>> = None;
    let mut natives: Option<Vec<NativeImport>> = None;
    let mut result: Option<ValueType> = None;
    let mut meta: Option<ModuleMeta> = None;

    while cursor < bytes.len() {
        let tag = read_tag(bytes, &mut cursor)?;
        let len = read_u32(bytes, &mut cursor)? as usize;
        ensure!(
            cursor.checked_add(len).is_some_and(|end| end <= bytes.len()),
            "section overruns payload"
        );
        let payload = &bytes[cursor..cursor + len];
        cursor += len;

        match &tag {
            b"CODE" => {
                ensure!(code.is_none(), "duplicate CODE section");
                disassemble(payload).context("CODE section is not valid bytecode")?;
                code = Some(payload.to_vec());
            }
            b"NATV" => {
                ensure!(natives.is_none(), "duplicate NATV section");
                natives = Some(decode_natives(payload)?);
            }
            b"RSLT" => {
                ensure!(result.is_none(), "duplicate RSLT section");
                ensure!(payload.len() == 1, "RSLT section must be one byte");
                result = Some(type_from_tag(payload[0])?);
            }
            b"META" => {
                ensure!(meta.is_none(), "duplicate META section");
                meta = Some(serde_json::from_slice(payload).context("invalid META section")?);
            }
            _ => {
                debug!(target: "hss::hssb", tag = %String::from_utf8_lossy(&tag), "hssb.skip_section");
            }
        }
    }

    let code = code.ok_or_else(|| anyhow!("missing CODE section"))?;
    debug!(target: "hss::hssb", version, code_bytes = code.len(), "hssb.decode");
    Ok(HssbModule {
        version,
        flags,
        program: CompiledProgram {
            code,
            result,
            natives: natives.unwrap_or_default(),
        },
        meta,
    })
}

fn decode_natives(payload: &[u8]) -> Result<Vec<NativeImport>> {
    let mut cursor = 0;
    let count = read_u16(payload, &mut cursor)? as usize;
    let mut imports = Vec::with_capacity(count);
    for _ in 0..count {
        let name = read_str(payload, &mut cursor)?;
        let arity = read_u8(payload, &mut cursor)? as usize;
        let mut params = Vec::with_capacity(arity);
        for _ in 0..arity {
            params.push(type_from_tag(read_u8(payload, &mut cursor)?)?);
        }
        let ret = match read_u8(payload, &mut cursor)? {
            0 => None,
            tag => Some(type_from_tag(tag)?),
        };
        imports.push(NativeImport::new(name, NativeSignature::new(params, ret)));
    }
    ensure!(cursor == payload.len(), "extra data at end of NATV section");
    Ok(imports)
}

fn write_native(out: &mut Vec<u8>, import: &NativeImport) -> Result<()> {
    write_str(out, &import.name)?;
    let params = &import.signature.params;
    let arity = u8::try_from(params.len()).with_context(|| format!("native '{}' has too many parameters", import.name))?;
    out.push(arity);
    out.extend(params.iter().map(|ty| ty.tag()));
    out.push(import.signature.ret.map_or(0, ValueType::tag));
    Ok(())
}

fn type_from_tag(tag: u8) -> Result<ValueType> {
    ValueType::from_tag(tag).ok_or_else(|| anyhow!("unknown type tag {}", tag))
}

fn write_section(out: &mut Vec<u8>, tag: [u8; 4], payload: &[u8]) -> Result<()> {
    let len = u32::try_from(payload.len()).context("section too large")?;
    out.extend_from_slice(&tag);
    write_u32(out, len);
    out.extend_from_slice(payload);
    Ok(())
}

fn write_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn write_str(out: &mut Vec<u8>, value: &str) -> Result<()> {
    let len = u16::try_from(value.len()).with_context(|| format!("name '{}' too long", value))?;
    write_u16(out, len);
    out.extend_from_slice(value.as_bytes());
    Ok(())
}

fn read_u8(bytes: &[u8], cursor: &mut usize) -> Result<u8> {
    let byte = *bytes
        .get(*cursor)
        .ok_or_else(|| anyhow!("unexpected end of input while reading u8"))?;
    *cursor += 1;
    Ok(byte)
}

fn read_u16(bytes: &[u8], cursor: &mut usize) -> Result<u16> {
    if *cursor + 2 > bytes.len() {
        bail!("unexpected end of input while reading u16");
    }
    let mut buf = [0u8; 2];
    buf.copy_from_slice(&bytes[*cursor..*cursor + 2]);
    *cursor += 2;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32(bytes: &[u8], cursor: &mut usize) -> Result<u32> {
    if *cursor + 4 > bytes.len() {
        bail!("unexpected end of input while reading u32");
    }
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[*cursor..*cursor + 4]);
    *cursor += 4;
    Ok(u32::from_le_bytes(buf))
}

fn read_str(bytes: &[u8], cursor: &mut usize) -> Result<String> {
    let len = read_u16(bytes, cursor)? as usize;
    if *cursor + len > bytes.len() {
        bail!("unexpected end of input while reading name");
    }
    let slice = &bytes[*cursor..*cursor + len];
    *cursor += len;
    String::from_utf8(slice.to_vec()).context("invalid UTF-8 in native name")
}

fn read_tag(bytes: &[u8], cursor: &mut usize) -> Result<[u8; 4]> {
    if *cursor + 4 > bytes.len() {
        bail!("unexpected end of input while reading section tag");
    }
    let mut tag = [0u8; 4];
    tag.copy_from_slice(&bytes[*cursor..*cursor + 4]);
    *cursor += 4;
    Ok(tag)
}
