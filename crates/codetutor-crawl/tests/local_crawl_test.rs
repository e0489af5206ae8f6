use codetutor_crawl::*;
use std::fs;
use tempfile::TempDir;

fn fixture() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("src/nested")).unwrap();
    fs::create_dir_all(root.join("tests")).unwrap();
    fs::write(root.join("src/main.py"), "print('hi')\n").unwrap();
    fs::write(root.join("src/nested/util.py"), "def util():\n    pass\n").unwrap();
    fs::write(root.join("src/readme.txt"), "not python").unwrap();
    fs::write(root.join("tests/test_main.py"), "assert True\n").unwrap();
    fs::write(root.join("src/big.py"), "x = 1\n".repeat(100)).unwrap();
    fs::write(root.join("src/blob.py"), [0xff, 0xfe, 0x00, 0x81]).unwrap();
    dir
}

fn request(dir: &TempDir) -> CrawlRequest {
    let mut request = CrawlRequest::new(RepositoryLocator::local(dir.path()));
    request.include = vec!["*.py".to_string()];
    request.exclude = vec!["tests/*".to_string()];
    request.max_file_size = 100;
    request
}

#[tokio::test]
async fn test_local_crawl_filters_and_sorts() {
    let dir = fixture();
    let contents = LocalCrawler.crawl(&request(&dir)).await.unwrap();

    let paths: Vec<_> = contents.files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, vec!["src/main.py", "src/nested/util.py"]);
    assert_eq!(contents.stats.downloaded_count, 2);
    assert!(!contents.stats.has_errors());
}

#[tokio::test]
async fn test_local_crawl_records_oversized_and_binary_skips() {
    let dir = fixture();
    let contents = LocalCrawler.crawl(&request(&dir)).await.unwrap();

    let skipped: Vec<_> = contents
        .stats
        .skipped_files
        .iter()
        .map(|s| (s.path.as_str(), s.size))
        .collect();
    assert!(skipped.contains(&("src/big.py", 600)));
    assert!(skipped.iter().any(|(p, _)| *p == "src/blob.py"));
    assert_eq!(contents.stats.skipped_count, 2);
}

#[tokio::test]
async fn test_local_crawl_respects_gitignore() {
    let dir = fixture();
    fs::write(dir.path().join(".gitignore"), "src/nested/\n").unwrap();
    let contents = LocalCrawler.crawl(&request(&dir)).await.unwrap();

    assert!(contents.get(0).is_some());
    assert!(contents.files.iter().all(|f| !f.path.starts_with("src/nested")));
}

#[tokio::test]
async fn test_missing_directory_is_recorded_not_raised() {
    let dir = TempDir::new().unwrap();
    let request = CrawlRequest::new(RepositoryLocator::local(dir.path().join("absent")));
    let contents = LocalCrawler.crawl(&request).await.unwrap();

    assert!(contents.is_empty());
    assert!(contents.stats.has_errors());
    assert!(contents.stats.errors[0].starts_with("Not found"));
}

#[tokio::test]
async fn test_default_crawler_dispatches_local() {
    let dir = fixture();
    let crawler = DefaultCrawler::new(std::time::Duration::from_secs(5)).unwrap();
    let contents = crawler.crawl(&request(&dir)).await.unwrap();
    assert_eq!(contents.len(), 2);
}
