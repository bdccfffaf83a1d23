//! Element and attribute names of the Darwin Core text guide.

pub const DWC_TEXT: &str = "http://rs.tdwg.org/dwc/text/";
pub const DWC_TERMS: &str = "http://rs.tdwg.org/dwc/terms/";
pub const AC_TERMS: &str = "http://rs.tdwg.org/ac/terms/";
pub const GBIF_TERMS: &str = "http://rs.gbif.org/terms/1.0/";
pub const SCHEMA_LOCATION: &str =
    "http://rs.tdwg.org/dwc/text/ http://rs.tdwg.org/dwc/text/tdwg_dwc_text.xsd";

pub const ARCHIVE: &str = "archive";
pub const CORE: &str = "core";
pub const EXTENSION: &str = "extension";
pub const FILES: &str = "files";
pub const LOCATION: &str = "location";
pub const FIELD: &str = "field";
pub const ID: &str = "id";
pub const CORE_ID: &str = "coreid";
/// Spelling found in some published archives.
pub const CORE_ID_CAMEL: &str = "coreId";

pub const ROW_TYPE: &str = "rowType";
pub const FIELDS_TERMINATED_BY: &str = "fieldsTerminatedBy";
pub const LINES_TERMINATED_BY: &str = "linesTerminatedBy";
pub const FIELDS_ENCLOSED_BY: &str = "fieldsEnclosedBy";
pub const ENCODING: &str = "encoding";
pub const IGNORE_HEADER_LINES: &str = "ignoreHeaderLines";
pub const DATE_FORMAT: &str = "dateFormat";
pub const INDEX: &str = "index";
pub const TERM: &str = "term";
pub const DEFAULT: &str = "default";
pub const VOCABULARY: &str = "vocabulary";
pub const DELIMITED_BY: &str = "delimitedBy";

pub const SIMPLE_DARWIN_RECORD: &str =
    "http://rs.tdwg.org/dwc/xsd/simpledarwincore/SimpleDarwinRecord";
pub const OCCURRENCE: &str = "http://rs.tdwg.org/dwc/terms/Occurrence";
pub const MULTIMEDIA: &str = "http://rs.gbif.org/terms/1.0/Multimedia";

/// File names accepted as the archive descriptor, compared case-insensitively.
pub const METADATA_FILE_NAMES: [&str; 2] = ["meta.xml", "metadata.xml"];
