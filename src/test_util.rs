pub(crate) fn corpus_file(text: &str) -> tempfile::NamedTempFile {
    corpus_bytes(text.as_bytes())
}

pub(crate) fn corpus_bytes(bytes: &[u8]) -> tempfile::NamedTempFile {
    use std::io::Write;

    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    file.write_all(bytes).expect("write corpus");
    file.flush().expect("flush corpus");
    file
}

pub(crate) fn open_corpus(text: &str) -> (tempfile::NamedTempFile, crate::reader::TextReader) {
    let file = corpus_file(text);
    let reader = crate::reader::TextReader::open(file.path(), 1 << 16, 64).expect("open corpus");
    (file, reader)
}
