/// File type inference from content signatures
use serde::Serialize;
use std::sync::OnceLock;

/// Closed set of formats the discovery engine distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FileType {
    Sii,
    Sui,
    Mat,
    Tobj,
    Dds,
    Pmd,
    Pmg,
    Pmc,
    Pma,
    Ppd,
    SoundRef,
    Bank,
    BankGuids,
    Font,
    Png,
    Jpeg,
    Tga,
    Ogg,
    Unknown,
}

impl FileType {
    /// Map a lowercase extension (without dot) to a type
    pub fn from_extension(ext: &str) -> Option<FileType> {
        let file_type = match ext {
            "sii" => FileType::Sii,
            "sui" => FileType::Sui,
            "mat" => FileType::Mat,
            "tobj" => FileType::Tobj,
            "dds" => FileType::Dds,
            "pmd" => FileType::Pmd,
            "pmg" => FileType::Pmg,
            "pmc" => FileType::Pmc,
            "pma" => FileType::Pma,
            "ppd" => FileType::Ppd,
            "soundref" => FileType::SoundRef,
            "bank" => FileType::Bank,
            "bank.guids" => FileType::BankGuids,
            "font" => FileType::Font,
            "png" => FileType::Png,
            "jpg" | "jpeg" => FileType::Jpeg,
            "tga" => FileType::Tga,
            "ogg" => FileType::Ogg,
            _ => return None,
        };
        Some(file_type)
    }

    /// Types that never contain path references
    pub fn is_ignorable(self) -> bool {
        matches!(
            self,
            FileType::Dds
                | FileType::Pmg
                | FileType::Pmc
                | FileType::Pma
                | FileType::Bank
                | FileType::BankGuids
                | FileType::Png
                | FileType::Jpeg
                | FileType::Tga
                | FileType::Ogg
        )
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FileType::Sii => "SII unit file",
            FileType::Sui => "SII include fragment",
            FileType::Mat => "Material",
            FileType::Tobj => "Texture descriptor",
            FileType::Dds => "DDS texture",
            FileType::Pmd => "Model descriptor",
            FileType::Pmg => "Model geometry",
            FileType::Pmc => "Model collision",
            FileType::Pma => "Model animation",
            FileType::Ppd => "Prefab descriptor",
            FileType::SoundRef => "Sound reference",
            FileType::Bank => "Sound bank",
            FileType::BankGuids => "Sound bank GUID table",
            FileType::Font => "Font descriptor",
            FileType::Png => "PNG image",
            FileType::Jpeg => "JPEG image",
            FileType::Tga => "TGA image",
            FileType::Ogg => "Ogg audio",
            FileType::Unknown => "Unknown",
        };
        write!(f, "{}", name)
    }
}

/// Piece counts above this in a version-4 header belong to an animation token hash
pub const MAX_PLAUSIBLE_PIECES: u32 = 1000;

/// How far into a buffer text preambles are examined
const TEXT_PREAMBLE: usize = 4096;

/// One content sniffer
#[derive(Debug, Clone, Copy)]
pub struct FileSignature {
    pub file_type: FileType,
    pub description: &'static str,
    detect: fn(&[u8]) -> Option<FileType>,
}

impl FileSignature {
    const fn new(
        file_type: FileType,
        description: &'static str,
        detect: fn(&[u8]) -> Option<FileType>,
    ) -> Self {
        Self {
            file_type,
            description,
            detect,
        }
    }
}

fn read_u32_le(data: &[u8], at: usize) -> Option<u32> {
    let bytes = data.get(at..at + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Strip a UTF-8 BOM and leading ASCII whitespace
fn text_start(data: &[u8]) -> &[u8] {
    let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
    let skip = data
        .iter()
        .take_while(|b| b.is_ascii_whitespace())
        .count();
    &data[skip..]
}

fn when(matched: bool, file_type: FileType) -> Option<FileType> {
    matched.then_some(file_type)
}

fn sniff_sii(data: &[u8]) -> Option<FileType> {
    let matched = text_start(data).starts_with(b"SiiNunit")
        || data.starts_with(b"BSII")
        || data.starts_with(b"ScsC")
        || data.starts_with(b"3nK");
    when(matched, FileType::Sii)
}

fn sniff_tobj(data: &[u8]) -> Option<FileType> {
    when(
        read_u32_le(data, 0) == Some(crate::formats::tobj::TOBJ_MAGIC),
        FileType::Tobj,
    )
}

fn sniff_dds(data: &[u8]) -> Option<FileType> {
    when(data.starts_with(b"DDS "), FileType::Dds)
}

fn sniff_png(data: &[u8]) -> Option<FileType> {
    when(
        data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]),
        FileType::Png,
    )
}

fn sniff_jpeg(data: &[u8]) -> Option<FileType> {
    when(data.starts_with(&[0xFF, 0xD8, 0xFF]), FileType::Jpeg)
}

fn sniff_bank(data: &[u8]) -> Option<FileType> {
    when(
        data.starts_with(b"RIFF") && data.get(8..12) == Some(&b"FEV "[..]),
        FileType::Bank,
    )
}

fn sniff_ogg(data: &[u8]) -> Option<FileType> {
    when(data.starts_with(b"OggS"), FileType::Ogg)
}

fn sniff_pmg(data: &[u8]) -> Option<FileType> {
    when(data.get(1..4) == Some(&b"Gmp"[..]), FileType::Pmg)
}

fn sniff_pmd_or_pma(data: &[u8]) -> Option<FileType> {
    if read_u32_le(data, 0) != Some(4) {
        return None;
    }
    let pieces = read_u32_le(data, 12)?;
    if pieces > MAX_PLAUSIBLE_PIECES {
        Some(FileType::Pma)
    } else {
        Some(FileType::Pmd)
    }
}

fn sniff_material(data: &[u8]) -> Option<FileType> {
    let text = text_start(data);
    when(
        text.starts_with(b"material") || text.starts_with(b"effect"),
        FileType::Mat,
    )
}

fn sniff_soundref(data: &[u8]) -> Option<FileType> {
    when(text_start(data).starts_with(b"source="), FileType::SoundRef)
}

fn sniff_guids(data: &[u8]) -> Option<FileType> {
    let text = text_start(data);
    let matched = text.len() >= 10
        && text[0] == b'{'
        && text[1..9].iter().all(u8::is_ascii_hexdigit)
        && text[9] == b'-';
    when(matched, FileType::BankGuids)
}

fn sniff_font(data: &[u8]) -> Option<FileType> {
    let preamble = &data[..data.len().min(TEXT_PREAMBLE)];
    if preamble.contains(&0) {
        return None;
    }
    let matched = preamble
        .split(|&b| b == b'\n')
        .any(|line| text_start(line).starts_with(b"image:"));
    when(matched, FileType::Font)
}

fn sniff_tga(data: &[u8]) -> Option<FileType> {
    const TRAILER: &[u8] = b"TRUEVISION-XFILE.\0";
    when(data.ends_with(TRAILER), FileType::Tga)
}

/// Ordered sniffer table; first match wins
pub fn signature_database() -> &'static [FileSignature] {
    static DATABASE: OnceLock<Vec<FileSignature>> = OnceLock::new();
    DATABASE.get_or_init(|| {
        let entry = FileSignature::new;
        vec![
            entry(FileType::Sii, "SII text or binary unit file", sniff_sii),
            entry(FileType::Tobj, "TOBJ texture descriptor", sniff_tobj),
            entry(FileType::Dds, "DirectDraw surface", sniff_dds),
            entry(FileType::Png, "PNG image", sniff_png),
            entry(FileType::Jpeg, "JPEG image", sniff_jpeg),
            entry(FileType::Bank, "FMOD sound bank", sniff_bank),
            entry(FileType::Ogg, "Ogg container", sniff_ogg),
            entry(FileType::Pmg, "Model geometry", sniff_pmg),
            entry(FileType::Pmd, "Model descriptor or animation", sniff_pmd_or_pma),
            entry(FileType::Mat, "Material", sniff_material),
            entry(FileType::SoundRef, "Sound reference", sniff_soundref),
            entry(FileType::BankGuids, "Sound bank GUID table", sniff_guids),
            entry(FileType::Font, "Font descriptor", sniff_font),
            entry(FileType::Tga, "TGA image", sniff_tga),
        ]
    })
}

/// Sniff a buffer's format from its content alone
pub fn sniff_file_type(data: &[u8]) -> FileType {
    signature_database()
        .iter()
        .find_map(|signature| (signature.detect)(data))
        .unwrap_or(FileType::Unknown)
}

/// Infer a buffer's format. A known extension hint wins over content sniffing.
pub fn infer_file_type(data: &[u8], extension_hint: Option<&str>) -> FileType {
    if let Some(file_type) = extension_hint.and_then(FileType::from_extension) {
        return file_type;
    }
    sniff_file_type(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_hint_wins() {
        assert_eq!(infer_file_type(b"DDS ", Some("sii")), FileType::Sii);
        assert_eq!(infer_file_type(b"DDS ", Some("xyz")), FileType::Dds);
        assert_eq!(infer_file_type(b"", Some("bank.guids")), FileType::BankGuids);
    }

    #[test]
    fn test_text_signatures() {
        assert_eq!(sniff_file_type(b"\xEF\xBB\xBF\r\n SiiNunit\n{"), FileType::Sii);
        assert_eq!(sniff_file_type(b"ScsC\0\0"), FileType::Sii);
        assert_eq!(sniff_file_type(b"effect : \"eut2.dif\" {"), FileType::Mat);
        assert_eq!(sniff_file_type(b"source=\"/sound/a.bank#x\""), FileType::SoundRef);
        assert_eq!(
            sniff_file_type(b"{0123abcd-0000-0000-0000-000000000000}"),
            FileType::BankGuids
        );
        assert_eq!(
            sniff_file_type(b"# font\nimage:/font/a.mat, 0, 0\n"),
            FileType::Font
        );
    }

    #[test]
    fn test_binary_signatures() {
        assert_eq!(sniff_file_type(&0x70B1_0A01u32.to_le_bytes()), FileType::Tobj);
        assert_eq!(sniff_file_type(b"RIFF\0\0\0\0FEV \0"), FileType::Bank);
        assert_eq!(sniff_file_type(b"RIFF\0\0\0\0WAVE"), FileType::Unknown);
        assert_eq!(sniff_file_type(b"\x15Gmp"), FileType::Pmg);
        let mut tga = vec![0u8; 40];
        tga.extend_from_slice(b"TRUEVISION-XFILE.\0");
        assert_eq!(sniff_file_type(&tga), FileType::Tga);
    }

    #[test]
    fn test_pmd_versus_pma() {
        let mut header = vec![0u8; 16];
        header[0] = 4;
        header[12..16].copy_from_slice(&12u32.to_le_bytes());
        assert_eq!(sniff_file_type(&header), FileType::Pmd);
        header[12..16].copy_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
        assert_eq!(sniff_file_type(&header), FileType::Pma);
        assert_eq!(sniff_file_type(&[4, 0, 0, 0]), FileType::Unknown);
    }

    #[test]
    fn test_never_panics_on_short_input() {
        for len in 0..20 {
            let data = vec![0x7Bu8; len];
            let _ = sniff_file_type(&data);
        }
        assert_eq!(sniff_file_type(b""), FileType::Unknown);
    }

    #[test]
    fn test_ignorable_types() {
        assert!(FileType::Dds.is_ignorable());
        assert!(FileType::BankGuids.is_ignorable());
        assert!(!FileType::Mat.is_ignorable());
        assert!(!FileType::Unknown.is_ignorable());
    }
}
