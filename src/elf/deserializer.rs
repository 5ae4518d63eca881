// Copyright (c) 2026 C64-Debug Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Cursor based reader shared by the ELF container and the DWARF decoders.

use gimli::DwForm;

use super::tables::{IndexTable, StringTable};
use crate::error::DecodeError;

/// Width of offsets, sizes and addresses: 32-bit or 64-bit DWARF/ELF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Bits32,
    Bits64,
}

impl Format {
    pub fn word_size(self) -> usize {
        match self {
            Format::Bits32 => 4,
            Format::Bits64 => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endian {
    #[default]
    Little,
    Big,
}

/// The "initial length" prefix of a DWARF unit plus the version that follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitHeader {
    pub format: Format,
    pub unit_length: u64,
    /// Offset of the first byte after the length field.
    pub start_ofs: usize,
    /// Offset of the first byte after the unit.
    pub end_ofs: usize,
    pub version: u16,
}

/// A decoded attribute value. Indirect strings and addresses are already
/// resolved through the lookup tables handed to [`Deserializer::read_attribute`].
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Unsigned(u64),
    Signed(i64),
    Flag(bool),
    String(String),
    Block(Vec<u8>),
    /// Offset of another entry, relative to its unit or section.
    Reference(u64),
    /// Value carried by the abbreviation (`DW_FORM_implicit_const`).
    Implicit,
}

impl AttributeValue {
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            AttributeValue::Unsigned(v) | AttributeValue::Reference(v) => Some(v),
            AttributeValue::Signed(v) => u64::try_from(v).ok(),
            AttributeValue::Flag(v) => Some(v as u64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            AttributeValue::Signed(v) => Some(v),
            AttributeValue::Unsigned(v) | AttributeValue::Reference(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Lookup tables used to resolve indirect attribute forms.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttributeParams<'t> {
    pub address_size: Option<u8>,
    pub string_table: Option<StringTable<'t>>,
    pub line_string_table: Option<StringTable<'t>>,
    pub string_offset_table: Option<&'t IndexTable>,
    pub str_offsets_base: Option<u64>,
    pub address_table: Option<&'t IndexTable>,
    pub addr_base: Option<u64>,
    pub range_table: Option<&'t IndexTable>,
    pub rnglists_base: Option<u64>,
    pub location_table: Option<&'t IndexTable>,
    pub loclists_base: Option<u64>,
}

pub struct Deserializer<'a> {
    data: &'a [u8],
    ofs: usize,
    format: Format,
    endian: Endian,
}

impl<'a> Deserializer<'a> {
    pub fn new(data: &'a [u8], endian: Endian) -> Self {
        Self {
            data,
            ofs: 0,
            format: Format::Bits32,
            endian,
        }
    }

    pub fn ofs(&self) -> usize {
        self.ofs
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.ofs)
    }

    pub fn is_eof(&self) -> bool {
        self.ofs >= self.data.len()
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn set_format(&mut self, format: Format) {
        self.format = format;
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn set_endian(&mut self, endian: Endian) {
        self.endian = endian;
    }

    pub fn set_offset(&mut self, ofs: usize) -> Result<(), DecodeError> {
        if ofs > self.data.len() {
            return Err(DecodeError::OutOfBounds);
        }
        self.ofs = ofs;
        Ok(())
    }

    pub fn skip(&mut self, count: usize) -> Result<(), DecodeError> {
        self.assert_available(count)?;
        self.ofs += count;
        Ok(())
    }

    fn assert_available(&self, count: usize) -> Result<(), DecodeError> {
        if count > self.remaining() {
            return Err(DecodeError::EndOfData);
        }
        Ok(())
    }

    pub fn read_raw(&mut self, count: usize) -> Result<&'a [u8], DecodeError> {
        self.assert_available(count)?;
        let bytes = &self.data[self.ofs..self.ofs + count];
        self.ofs += count;
        Ok(bytes)
    }

    /// Reads an unsigned integer of `size` bytes (1 to 8) in the current byte order.
    pub fn read_uint(&mut self, size: usize) -> Result<u64, DecodeError> {
        if size > 8 {
            return Err(DecodeError::OutOfBounds);
        }
        let bytes = self.read_raw(size)?;
        let value = match self.endian {
            Endian::Little => bytes
                .iter()
                .rev()
                .fold(0u64, |acc, &b| (acc << 8) | b as u64),
            Endian::Big => bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64),
        };
        Ok(value)
    }

    pub fn read8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.read_raw(1)?[0])
    }

    pub fn read8s(&mut self) -> Result<i8, DecodeError> {
        Ok(self.read8()? as i8)
    }

    pub fn read16(&mut self) -> Result<u16, DecodeError> {
        Ok(self.read_uint(2)? as u16)
    }

    pub fn read32(&mut self) -> Result<u32, DecodeError> {
        Ok(self.read_uint(4)? as u32)
    }

    pub fn read64(&mut self) -> Result<u64, DecodeError> {
        self.read_uint(8)
    }

    pub fn read128(&mut self) -> Result<u128, DecodeError> {
        let first = self.read64()? as u128;
        let second = self.read64()? as u128;
        Ok(match self.endian {
            Endian::Little => (second << 64) | first,
            Endian::Big => (first << 64) | second,
        })
    }

    /// Section offset, 4 or 8 bytes depending on the format.
    pub fn read_offs(&mut self) -> Result<u64, DecodeError> {
        self.read_uint(self.format.word_size())
    }

    /// Target address, 4 or 8 bytes depending on the format.
    pub fn read_addr(&mut self) -> Result<u64, DecodeError> {
        self.read_uint(self.format.word_size())
    }

    pub fn read_size(&mut self) -> Result<u64, DecodeError> {
        self.read_uint(self.format.word_size())
    }

    /// Unsigned LEB128. A value cut short by the end of the buffer reads as 0.
    pub fn read_uleb128(&mut self) -> Result<u64, DecodeError> {
        self.assert_available(1)?;
        let mut result = 0u64;
        let mut shift = 0u32;
        loop {
            let Some(&byte) = self.data.get(self.ofs) else {
                return Ok(0);
            };
            self.ofs += 1;
            if shift < 64 {
                result |= ((byte & 0x7f) as u64) << shift;
            }
            shift += 7;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }
    }

    /// Signed LEB128. A value cut short by the end of the buffer reads as 0.
    pub fn read_leb128(&mut self) -> Result<i64, DecodeError> {
        self.assert_available(1)?;
        let mut result = 0i64;
        let mut shift = 0u32;
        loop {
            let Some(&byte) = self.data.get(self.ofs) else {
                return Ok(0);
            };
            self.ofs += 1;
            if shift < 64 {
                result |= ((byte & 0x7f) as i64) << shift;
            }
            shift += 7;
            if byte & 0x80 == 0 {
                if shift < 64 && byte & 0x40 != 0 {
                    result |= !0i64 << shift;
                }
                return Ok(result);
            }
        }
    }

    /// Reads bytes up to a NUL terminator or the end of the buffer.
    pub fn read_cstring(&mut self) -> Result<String, DecodeError> {
        self.assert_available(1)?;
        let rest = &self.data[self.ofs..];
        let len = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
        let s = String::from_utf8_lossy(&rest[..len]).into_owned();
        self.ofs += (len + 1).min(rest.len());
        Ok(s)
    }

    /// Decodes the DWARF initial length: `0xffffffff` announces 64-bit format
    /// with an 8-byte length, values below `0xfffffff0` are a 32-bit length.
    /// The reserved range reads as an empty unit.
    pub fn read_unit_length(&mut self) -> Result<(Format, u64, usize, usize), DecodeError> {
        let initial = self.read32()?;
        let (format, unit_length) = if initial == 0xffff_ffff {
            (Format::Bits64, self.read64()?)
        } else if initial < 0xffff_fff0 {
            (Format::Bits32, initial as u64)
        } else {
            (Format::Bits32, 0)
        };
        let start_ofs = self.ofs;
        let end_ofs = usize::try_from(unit_length)
            .ok()
            .and_then(|len| start_ofs.checked_add(len))
            .filter(|&end| end <= self.data.len())
            .ok_or(DecodeError::EndOfData)?;
        Ok((format, unit_length, start_ofs, end_ofs))
    }

    pub fn read_unit_header(&mut self) -> Result<UnitHeader, DecodeError> {
        let (format, unit_length, start_ofs, end_ofs) = self.read_unit_length()?;
        let version = self.read16()?;
        Ok(UnitHeader {
            format,
            unit_length,
            start_ofs,
            end_ofs,
            version,
        })
    }

    /// Decodes one attribute value of the given form, resolving string,
    /// address and list indices through `params`.
    pub fn read_attribute(
        &mut self,
        form: DwForm,
        params: &AttributeParams,
    ) -> Result<AttributeValue, DecodeError> {
        let value = match form {
            gimli::DW_FORM_addr => {
                let size = params
                    .address_size
                    .map(usize::from)
                    .unwrap_or(self.format.word_size());
                AttributeValue::Unsigned(self.read_uint(size)?)
            }
            gimli::DW_FORM_data1 => AttributeValue::Unsigned(self.read8()? as u64),
            gimli::DW_FORM_data2 => AttributeValue::Unsigned(self.read16()? as u64),
            gimli::DW_FORM_data4 => AttributeValue::Unsigned(self.read32()? as u64),
            gimli::DW_FORM_data8 => AttributeValue::Unsigned(self.read64()?),
            gimli::DW_FORM_data16 => AttributeValue::Block(self.read_raw(16)?.to_vec()),
            gimli::DW_FORM_sdata => AttributeValue::Signed(self.read_leb128()?),
            gimli::DW_FORM_udata => AttributeValue::Unsigned(self.read_uleb128()?),
            gimli::DW_FORM_flag => AttributeValue::Flag(self.read8()? != 0),
            gimli::DW_FORM_flag_present => AttributeValue::Flag(true),
            gimli::DW_FORM_string => AttributeValue::String(self.read_cstring()?),

            gimli::DW_FORM_block1 => {
                let len = self.read8()? as usize;
                AttributeValue::Block(self.read_raw(len)?.to_vec())
            }
            gimli::DW_FORM_block2 => {
                let len = self.read16()? as usize;
                AttributeValue::Block(self.read_raw(len)?.to_vec())
            }
            gimli::DW_FORM_block4 => {
                let len = self.read32()? as usize;
                AttributeValue::Block(self.read_raw(len)?.to_vec())
            }
            gimli::DW_FORM_block | gimli::DW_FORM_exprloc => {
                let len = usize::try_from(self.read_uleb128()?).map_err(|_| DecodeError::EndOfData)?;
                AttributeValue::Block(self.read_raw(len)?.to_vec())
            }

            gimli::DW_FORM_ref1 => AttributeValue::Reference(self.read8()? as u64),
            gimli::DW_FORM_ref2 => AttributeValue::Reference(self.read16()? as u64),
            gimli::DW_FORM_ref4 | gimli::DW_FORM_ref_sup4 => {
                AttributeValue::Reference(self.read32()? as u64)
            }
            gimli::DW_FORM_ref8 | gimli::DW_FORM_ref_sig8 | gimli::DW_FORM_ref_sup8 => {
                AttributeValue::Reference(self.read64()?)
            }
            gimli::DW_FORM_ref_udata => AttributeValue::Reference(self.read_uleb128()?),
            gimli::DW_FORM_ref_addr => AttributeValue::Reference(self.read_offs()?),
            gimli::DW_FORM_sec_offset => AttributeValue::Unsigned(self.read_offs()?),

            gimli::DW_FORM_strp | gimli::DW_FORM_strp_sup => {
                let ofs = self.read_offs()?;
                let table = params
                    .string_table
                    .ok_or(DecodeError::UnresolvedReference)?;
                AttributeValue::String(table.get(ofs)?)
            }
            gimli::DW_FORM_line_strp => {
                let ofs = self.read_offs()?;
                let table = params
                    .line_string_table
                    .or(params.string_table)
                    .ok_or(DecodeError::UnresolvedReference)?;
                AttributeValue::String(table.get(ofs)?)
            }
            gimli::DW_FORM_strx
            | gimli::DW_FORM_strx1
            | gimli::DW_FORM_strx2
            | gimli::DW_FORM_strx3
            | gimli::DW_FORM_strx4 => {
                let index = self.read_index(form)?;
                let offsets = params
                    .string_offset_table
                    .ok_or(DecodeError::UnresolvedOffset)?;
                let ofs = offsets
                    .get(params.str_offsets_base, index)
                    .ok_or(DecodeError::UnresolvedOffset)?;
                let table = params
                    .string_table
                    .ok_or(DecodeError::UnresolvedReference)?;
                AttributeValue::String(table.get(ofs)?)
            }
            gimli::DW_FORM_addrx
            | gimli::DW_FORM_addrx1
            | gimli::DW_FORM_addrx2
            | gimli::DW_FORM_addrx3
            | gimli::DW_FORM_addrx4 => {
                let index = self.read_index(form)?;
                let addr = params
                    .address_table
                    .and_then(|table| table.get(params.addr_base, index))
                    .ok_or(DecodeError::UnresolvedReference)?;
                AttributeValue::Unsigned(addr)
            }
            gimli::DW_FORM_rnglistx => {
                let index = self.read_uleb128()?;
                let ofs = params
                    .range_table
                    .and_then(|table| table.get(params.rnglists_base, index))
                    .ok_or(DecodeError::UnresolvedReference)?;
                AttributeValue::Unsigned(ofs)
            }
            gimli::DW_FORM_loclistx => {
                let index = self.read_uleb128()?;
                let ofs = params
                    .location_table
                    .and_then(|table| table.get(params.loclists_base, index))
                    .ok_or(DecodeError::UnresolvedReference)?;
                AttributeValue::Unsigned(ofs)
            }

            gimli::DW_FORM_implicit_const => AttributeValue::Implicit,
            gimli::DW_FORM_indirect => {
                let actual = DwForm(self.read_uleb128()? as u16);
                if actual == gimli::DW_FORM_indirect {
                    return Err(DecodeError::UnhandledForm(actual.0));
                }
                return self.read_attribute(actual, params);
            }
            other => return Err(DecodeError::UnhandledForm(other.0)),
        };
        Ok(value)
    }

    fn read_index(&mut self, form: DwForm) -> Result<u64, DecodeError> {
        match form {
            gimli::DW_FORM_strx1 | gimli::DW_FORM_addrx1 => self.read_uint(1),
            gimli::DW_FORM_strx2 | gimli::DW_FORM_addrx2 => self.read_uint(2),
            gimli::DW_FORM_strx3 | gimli::DW_FORM_addrx3 => self.read_uint(3),
            gimli::DW_FORM_strx4 | gimli::DW_FORM_addrx4 => self.read_uint(4),
            _ => self.read_uleb128(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uleb(mut value: u64) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                out.push(byte);
                return out;
            }
            out.push(byte | 0x80);
        }
    }

    fn sleb(mut value: i64) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            let done = (value == 0 && byte & 0x40 == 0) || (value == -1 && byte & 0x40 != 0);
            if done {
                out.push(byte);
                return out;
            }
            out.push(byte | 0x80);
        }
    }

    #[test]
    fn test_uleb128_values() {
        for n in [0u64, 1, 127, 128, 624485, (1 << 35) - 1] {
            let bytes = uleb(n);
            let mut d = Deserializer::new(&bytes, Endian::Little);
            assert_eq!(d.read_uleb128().unwrap(), n, "uleb {}", n);
            assert!(d.is_eof());
        }
    }

    #[test]
    fn test_leb128_sign_extension() {
        for n in [0i64, 1, -1, 63, -64, 64, -65, -123456, 1 << 34, -(1 << 34)] {
            let bytes = sleb(n);
            let mut d = Deserializer::new(&bytes, Endian::Little);
            assert_eq!(d.read_leb128().unwrap(), n, "sleb {}", n);
        }
        // 0x7f alone is -1
        let mut d = Deserializer::new(&[0x7f], Endian::Little);
        assert_eq!(d.read_leb128().unwrap(), -1);
    }

    fn boundaries() -> Vec<u64> {
        let mut values = Vec::new();
        for k in 0..35 {
            let p = 1u64 << k;
            values.extend([p - 1, p, p + 1]);
        }
        values.push((1 << 35) - 1);
        values
    }

    #[test]
    fn test_leb128_bit_length_boundaries() {
        for n in boundaries() {
            let bytes = uleb(n);
            let mut d = Deserializer::new(&bytes, Endian::Little);
            assert_eq!(d.read_uleb128().unwrap(), n, "uleb {}", n);
            assert!(d.is_eof(), "uleb {} left bytes", n);

            for s in [n as i64, -(n as i64)] {
                let bytes = sleb(s);
                let mut d = Deserializer::new(&bytes, Endian::Little);
                assert_eq!(d.read_leb128().unwrap(), s, "sleb {}", s);
                assert!(d.is_eof(), "sleb {} left bytes", s);
            }
        }
    }

    #[test]
    fn test_leb128_strided_range() {
        // one buffer per pass so the cursor must land on each value boundary
        let values: Vec<u64> = (0..1u64 << 35).step_by(104_729).collect();

        let mut bytes = Vec::new();
        for &n in &values {
            bytes.extend(uleb(n));
        }
        let mut d = Deserializer::new(&bytes, Endian::Little);
        for &n in &values {
            assert_eq!(d.read_uleb128().unwrap(), n);
        }
        assert!(d.is_eof());

        let mut bytes = Vec::new();
        for &n in &values {
            bytes.extend(sleb(n as i64));
            bytes.extend(sleb(-(n as i64)));
        }
        let mut d = Deserializer::new(&bytes, Endian::Little);
        for &n in &values {
            assert_eq!(d.read_leb128().unwrap(), n as i64);
            assert_eq!(d.read_leb128().unwrap(), -(n as i64));
        }
        assert!(d.is_eof());
    }

    #[test]
    fn test_truncated_leb128_reads_zero() {
        let mut d = Deserializer::new(&[0x80, 0x80], Endian::Little);
        assert_eq!(d.read_uleb128().unwrap(), 0);
        let mut d = Deserializer::new(&[0xff], Endian::Little);
        assert_eq!(d.read_leb128().unwrap(), 0);
    }

    #[test]
    fn test_fixed_width_and_endianness() {
        let bytes = [0x12, 0x34, 0x56, 0x78];
        let mut d = Deserializer::new(&bytes, Endian::Little);
        assert_eq!(d.read16().unwrap(), 0x3412);
        d.set_endian(Endian::Big);
        assert_eq!(d.read16().unwrap(), 0x5678);
        assert!(matches!(d.read8(), Err(DecodeError::EndOfData)));
        assert!(matches!(d.set_offset(5), Err(DecodeError::OutOfBounds)));
    }

    #[test]
    fn test_cstring_without_terminator() {
        let mut d = Deserializer::new(b"main\0tail", Endian::Little);
        assert_eq!(d.read_cstring().unwrap(), "main");
        assert_eq!(d.read_cstring().unwrap(), "tail");
        assert!(d.is_eof());
    }

    #[test]
    fn test_unit_header_32bit() {
        let mut bytes = vec![0x06, 0x00, 0x00, 0x00, 0x05, 0x00];
        bytes.extend_from_slice(&[0; 4]);
        let mut d = Deserializer::new(&bytes, Endian::Little);
        let header = d.read_unit_header().unwrap();
        assert_eq!(header.format, Format::Bits32);
        assert_eq!(header.unit_length, 6);
        assert_eq!(header.start_ofs, 4);
        assert_eq!(header.end_ofs, 10);
        assert_eq!(header.version, 5);
    }

    #[test]
    fn test_unit_header_64bit() {
        let mut bytes = vec![0xff, 0xff, 0xff, 0xff];
        bytes.extend_from_slice(&2u64.to_le_bytes());
        bytes.extend_from_slice(&[0x05, 0x00]);
        let mut d = Deserializer::new(&bytes, Endian::Little);
        let header = d.read_unit_header().unwrap();
        assert_eq!(header.format, Format::Bits64);
        assert_eq!(header.unit_length, 2);
        assert_eq!(header.start_ofs, 12);
        assert_eq!(header.end_ofs, 14);
    }

    #[test]
    fn test_read_attribute_forms() {
        let strings = b"\0hello\0";
        let table = StringTable::new(strings);
        let params = AttributeParams {
            string_table: Some(table),
            address_size: Some(2),
            ..Default::default()
        };

        let bytes = [0x01, 0x00, 0x00, 0x00, 0x34, 0x12, 0x2a];
        let mut d = Deserializer::new(&bytes, Endian::Little);
        assert_eq!(
            d.read_attribute(gimli::DW_FORM_strp, &params).unwrap(),
            AttributeValue::String("hello".to_string())
        );
        assert_eq!(
            d.read_attribute(gimli::DW_FORM_addr, &params).unwrap(),
            AttributeValue::Unsigned(0x1234)
        );
        assert_eq!(
            d.read_attribute(gimli::DW_FORM_data1, &params).unwrap(),
            AttributeValue::Unsigned(42)
        );
    }

    #[test]
    fn test_read_attribute_failures() {
        let bytes = [0x00, 0x00];
        let params = AttributeParams::default();

        let mut d = Deserializer::new(&bytes, Endian::Little);
        assert!(matches!(
            d.read_attribute(gimli::DW_FORM_strx1, &params),
            Err(DecodeError::UnresolvedOffset)
        ));

        let mut d = Deserializer::new(&bytes, Endian::Little);
        assert!(matches!(
            d.read_attribute(gimli::DW_FORM_addrx1, &params),
            Err(DecodeError::UnresolvedReference)
        ));

        let mut d = Deserializer::new(&bytes, Endian::Little);
        assert!(matches!(
            d.read_attribute(DwForm(0x7f), &params),
            Err(DecodeError::UnhandledForm(0x7f))
        ));
    }
}
