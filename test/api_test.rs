use c64_debug_helper::elf::SectionKind;
use c64_debug_helper::{normalize_path, DebugInfo, Elf, ProjectContext, ToolchainKind};
use std::fs;
use std::path::{Path, PathBuf};

const ALL_KINDS: [ToolchainKind; 6] = [
    ToolchainKind::Acme,
    ToolchainKind::Cc65,
    ToolchainKind::KickAssembler,
    ToolchainKind::Oscar64,
    ToolchainKind::Basic,
    ToolchainKind::Elf,
];

/// Little endian ELF32 image assembled section by section.
struct ElfBuilder {
    names: Vec<u8>,
    sections: Vec<(u32, u32, Vec<u8>, u32, u32)>, // name, type, data, link, entsize
}

impl ElfBuilder {
    fn new() -> Self {
        Self {
            names: vec![0],
            sections: Vec::new(),
        }
    }

    fn name(&mut self, name: &str) -> u32 {
        let ofs = self.names.len() as u32;
        self.names.extend_from_slice(name.as_bytes());
        self.names.push(0);
        ofs
    }

    /// Adds a section and returns its header index.
    fn section(&mut self, name: &str, section_type: u32, data: Vec<u8>, link: u32, entsize: u32) -> u32 {
        let name = self.name(name);
        self.sections.push((name, section_type, data, link, entsize));
        self.sections.len() as u32 + 1 // null header and .shstrtab come first
    }

    fn build(mut self) -> Vec<u8> {
        let shstrtab_name = self.name(".shstrtab");

        let mut body = self.names.clone();
        let mut headers: Vec<[u32; 10]> = vec![[0; 10]];
        headers.push([shstrtab_name, 3, 0, 0, 52, self.names.len() as u32, 0, 0, 1, 0]);
        for (name, section_type, data, link, entsize) in &self.sections {
            let offset = 52 + body.len() as u32;
            headers.push([*name, *section_type, 0, 0, offset, data.len() as u32, *link, 0, 1, *entsize]);
            body.extend_from_slice(data);
        }

        let shoff = 52 + body.len() as u32;
        let mut out = Vec::new();
        out.extend_from_slice(&[0x7f, b'E', b'L', b'F', 1, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        out.extend_from_slice(&2u16.to_le_bytes()); // executable
        out.extend_from_slice(&0x1966u16.to_le_bytes()); // MOS 6502
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(&0x0801u32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&shoff.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&52u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&40u16.to_le_bytes());
        out.extend_from_slice(&(headers.len() as u16).to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&body);
        for header in headers {
            for field in header {
                out.extend_from_slice(&field.to_le_bytes());
            }
        }
        out
    }
}

/// DWARF 5 line program for `source`: line 5 at $0801-$0803, line 6 at $0804-$0805.
fn debug_line(source: &str) -> Vec<u8> {
    let program: &[u8] = &[
        0x00, 3, 0x02, 0x01, 0x08, // DW_LNE_set_address $0801
        0x03, 4,    // advance_line +4
        0x01, // copy
        61,   // special: address +3, line +1
        0x02, 2, // advance_pc 2
        0x00, 1, 0x01, // DW_LNE_end_sequence
    ];
    line_unit(source, program)
}

fn line_unit(source: &str, program: &[u8]) -> Vec<u8> {
    let mut tables = Vec::new();
    // directories: DW_LNCT_path as DW_FORM_string
    tables.extend_from_slice(&[1, 0x01, 0x08, 1]);
    tables.extend_from_slice(b"/\0");
    // files: DW_LNCT_path as DW_FORM_string, DW_LNCT_directory_index as DW_FORM_udata
    tables.extend_from_slice(&[2, 0x01, 0x08, 0x02, 0x0f, 2]);
    for _ in 0..2 {
        tables.extend_from_slice(source.as_bytes());
        tables.extend_from_slice(&[0, 0]);
    }

    let mut header = vec![1, 1, 1, 0xfb, 14, 13];
    header.extend_from_slice(&[0, 1, 1, 1, 1, 0, 0, 0, 1, 0, 0, 1]);
    header.extend_from_slice(&tables);

    let mut unit = Vec::new();
    unit.extend_from_slice(&5u16.to_le_bytes());
    unit.push(2); // address size
    unit.push(0);
    unit.extend_from_slice(&(header.len() as u32).to_le_bytes());
    unit.extend_from_slice(&header);
    unit.extend_from_slice(program);

    let mut out = (unit.len() as u32).to_le_bytes().to_vec();
    out.extend_from_slice(&unit);
    out
}

fn symbol(name: u32, value: u32, size: u32, info: u8) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&name.to_le_bytes());
    out.extend_from_slice(&value.to_le_bytes());
    out.extend_from_slice(&size.to_le_bytes());
    out.push(info);
    out.push(0);
    out.extend_from_slice(&1u16.to_le_bytes());
    out
}

fn sample_elf(source: &str) -> Vec<u8> {
    let mut builder = ElfBuilder::new();
    builder.section(".debug_line", 1, debug_line(source), 0, 0);

    let strtab = b"\0counter\0main\0".to_vec();
    let mut symtab = vec![0u8; 16];
    symtab.extend(symbol(1, 0x0900, 2, 0x11)); // global object
    symtab.extend(symbol(9, 0x0801, 5, 0x12)); // global function
    // .strtab lands right after .symtab
    let strtab_index = builder.sections.len() as u32 + 3;
    builder.section(".symtab", 2, symtab, strtab_index, 16);
    builder.section(".strtab", 3, strtab, 0, 0);
    builder.build()
}

fn write(dir: &Path, name: &str, contents: impl AsRef<[u8]>) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).expect("Failed to write fixture");
    path
}

#[test]
fn test_missing_file_does_not_exist() {
    let dir = tempfile::tempdir().unwrap();
    let project = ProjectContext::new(dir.path());
    for kind in ALL_KINDS {
        let err = DebugInfo::load(kind, &project, &dir.path().join("missing.dbg")).unwrap_err();
        assert!(err.to_string().contains("does not exist"), "{}: {}", kind, err);
    }
}

#[test]
fn test_directory_is_unable_to_read() {
    let dir = tempfile::tempdir().unwrap();
    let project = ProjectContext::new(dir.path());
    for kind in ALL_KINDS {
        let err = DebugInfo::load(kind, &project, dir.path()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("unable to read"), "{}: {}", kind, message);
        assert!(!message.contains("does not exist"), "{}: {}", kind, message);
    }
}

#[test]
fn test_elf_sections_resolve_lazily() {
    let elf = Elf::parse(sample_elf("/proj/main.c")).expect("Failed to parse ELF");

    let line_section = elf.section(".debug_line").unwrap();
    assert_eq!(line_section.kind, SectionKind::DebugLine);
    assert!(!line_section.is_resolved());

    let lines = elf.debug_line().unwrap().unwrap();
    assert!(line_section.is_resolved());
    assert_eq!(lines.units.len(), 1);
    assert_eq!(lines.entries.len(), 2);
    assert_eq!((lines.entries[0].address, lines.entries[0].address_end), (0x0801, 0x0803));
    assert_eq!((lines.entries[1].address, lines.entries[1].address_end), (0x0804, 0x0805));

    let symbols = elf.symbol_table().unwrap().unwrap();
    assert_eq!(symbols.len(), 3);
    assert!(symbols.find("counter").unwrap().is_object());
    assert!(symbols.find("main").unwrap().is_function());
}

#[test]
fn test_elf_ingestion_and_lookups() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("main.c");
    write(dir.path(), "main.c", "int main() {}\n");
    let elf_path = write(dir.path(), "prog.elf", sample_elf(&source.to_string_lossy()));

    let kind = ToolchainKind::from_path(&elf_path, false).unwrap();
    let db = DebugInfo::load(kind, &ProjectContext::new(dir.path()), &elf_path).expect("Failed to load ELF");

    let info = db.get_address_info(0x0802).unwrap();
    assert_eq!(info.line, 5);
    assert_eq!(info.normalized_path.as_deref(), Some(normalize_path(&source).as_str()));
    assert_eq!(db.find_next_line(0x0801).unwrap().line, 6);
    assert_eq!(db.find_nearest_code_line(&source.to_string_lossy(), 6).unwrap().address, 0x0804);

    let counter = db.get_symbol("counter").unwrap();
    assert_eq!((counter.value, counter.memory_size), (0x0900, 2));
    assert!(counter.index.is_some());
    assert!(db.get_symbol("main").is_none());

    assert_eq!(db.filename(), Some(elf_path.as_path()));
    assert!(db.timestamp().is_some());
}

#[test]
fn test_elf_rows_past_top_of_memory_are_dropped() {
    let program: &[u8] = &[
        0x00, 3, 0x02, 0x01, 0x08, // DW_LNE_set_address $0801
        0x01, // copy
        0x02, 0xff, 0xff, 0x7f, // advance_pc $1fffff
        0x03, 1,    // advance_line +1
        0x01, // copy
        0x02, 1, // advance_pc 1
        0x00, 1, 0x01, // DW_LNE_end_sequence
        0x00, 3, 0x02, 0x00, 0x09, // DW_LNE_set_address $0900
        0x03, 9,    // advance_line +9
        0x01, // copy
        0x02, 2, // advance_pc 2
        0x00, 1, 0x01, // DW_LNE_end_sequence
    ];
    let mut builder = ElfBuilder::new();
    builder.section(".debug_line", 1, line_unit("/proj/main.c", program), 0, 0);

    let dir = tempfile::tempdir().unwrap();
    let elf_path = write(dir.path(), "wide.elf", builder.build());
    let db = DebugInfo::load(ToolchainKind::Elf, &ProjectContext::new(dir.path()), &elf_path).unwrap();

    assert!(db.get_address_info(0x0801).is_none());
    assert!(db.get_address_info(0xffff).is_none());
    assert_eq!(db.get_address_info(0x0901).unwrap().line, 10);
    assert_eq!(db.addresses().len(), 1);
}

#[test]
fn test_basic_map_outside_address_space_is_dropped() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "prog.bas", "10 PRINT\n");
    let map = write(dir.path(), "prog.map", "prog.bas\n0,16777215,10,0,1\n2049,2058,10,0,8\n");

    let db = DebugInfo::load(ToolchainKind::Basic, &ProjectContext::new(dir.path()), &map).unwrap();
    assert_eq!(db.addresses().len(), 1);
    assert!(db.get_address_info(0).is_none());
    assert!(db.get_address_info(0xff_ffff).is_none());
    assert_eq!(db.get_address_info(2050).unwrap().line, 1);
}

#[test]
fn test_acme_report_with_multiple_sources() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.asm", "");
    write(dir.path(), "b.asm", "");
    let report = write(
        dir.path(),
        "prog.report",
        "; ******** Source: a.asm\n\
         \x20    1                          start\n\
         \x20    2  0801 a900               lda #0\n\
         \u{FFFD}     1  0803 60                 rts\n",
    );

    let mut project = ProjectContext::new(dir.path());
    project.asm_sources = vec![PathBuf::from("a.asm"), PathBuf::from("b.asm")];

    let db = DebugInfo::load(ToolchainKind::Acme, &project, &report).unwrap();

    let a = db.line_list(&dir.path().join("a.asm").to_string_lossy()).unwrap();
    assert_eq!(a.len(), 1);
    assert_eq!(a[0].debug_labels[0].name, "start");
    let b = db.line_list(&dir.path().join("b.asm").to_string_lossy()).unwrap();
    assert_eq!(b[0].address, 0x0803);
    assert_eq!(db.get_label("start").unwrap().address, 0x0801);
}

#[test]
fn test_basic_line_map_through_store() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "prog.bas", "10 PRINT\n20 GOTO 10\n");
    let map = write(dir.path(), "prog.map", "# line map\nprog.bas\n2049,2058,10,0,8\n2059,2066,20,1,8\n");

    let db = DebugInfo::load(ToolchainKind::Basic, &ProjectContext::new(dir.path()), &map).unwrap();
    assert_eq!(db.get_address_info(2060).unwrap().line, 2);
    assert_eq!(db.addresses().len(), 2);
}

#[test]
fn test_kick_debug_dump_detected_by_extension() {
    let dir = tempfile::tempdir().unwrap();
    let dump = write(
        dir.path(),
        "main.dbg",
        r#"<C64debugger version="1.0">
  <Sources values="INDEX,FILE">
    0,/proj/main.asm
  </Sources>
  <Segment name="Default" values="START,END,FILE_IDX,LINE1,COL1,LINE2,COL2">
    <Block name="Code">
      $c000,$c002,0,4,1,4,10
    </Block>
  </Segment>
  <Labels values="SEGMENT,ADDRESS,NAME">
    Default,$c000,entry
  </Labels>
</C64debugger>"#,
    );

    let kind = ToolchainKind::from_path(&dump, true).unwrap();
    assert_eq!(kind, ToolchainKind::KickAssembler);
    let db = DebugInfo::load(kind, &ProjectContext::default(), &dump).unwrap();
    assert_eq!(db.get_address_info(0xc001).unwrap().line, 4);
    assert_eq!(db.get_symbol("entry").unwrap().value, 0xc000);
    assert_eq!(db.find_label(0xc002).unwrap().name, "entry");
}
