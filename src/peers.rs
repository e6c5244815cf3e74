//! 피어 주소록
//!
//! `name,address` 줄 단위 텍스트 파일. 추가 전용이며 주소 기준으로 중복 제거.

use std::fs::OpenOptions;
use std::io::Write;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::{Error, Result};

/// 주소록 항목
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub name: String,
    pub addr: IpAddr,
}

/// 파일 기반 주소록
#[derive(Debug)]
pub struct PeerBook {
    path: PathBuf,
    peers: Vec<Peer>,
}

impl PeerBook {
    /// 주소록 로드. 파일이 없으면 빈 주소록
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Ok(Self {
                path,
                peers: Vec::new(),
            });
        }

        let text = std::fs::read_to_string(&path)?;
        let mut peers = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let (name, addr) = line.split_once(',').ok_or_else(|| Error::PeerBook {
                path: path.clone(),
                reason: format!("{}번째 줄: 'name,address' 형식이 아님", lineno + 1),
            })?;
            let addr = addr.trim().parse().map_err(|_| Error::PeerBook {
                path: path.clone(),
                reason: format!("{}번째 줄: 잘못된 주소 {:?}", lineno + 1, addr.trim()),
            })?;

            peers.push(Peer {
                name: name.trim().to_string(),
                addr,
            });
        }

        Ok(Self { path, peers })
    }

    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 이름 또는 주소 문자열로 검색
    pub fn find(&self, name_or_addr: &str) -> Option<&Peer> {
        let addr: Option<IpAddr> = name_or_addr.parse().ok();
        self.peers
            .iter()
            .find(|peer| peer.name == name_or_addr || Some(peer.addr) == addr)
    }

    /// 새 주소면 파일 끝에 추가. 추가했으면 true
    pub fn add(&mut self, name: &str, addr: IpAddr) -> Result<bool> {
        if self.peers.iter().any(|peer| peer.addr == addr) {
            return Ok(false);
        }

        let name = name.trim();
        if name.is_empty() || name.contains(',') || name.contains('\n') {
            return Err(Error::PeerBook {
                path: self.path.clone(),
                reason: format!("사용할 수 없는 이름: {:?}", name),
            });
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{},{}", name, addr)?;

        info!("피어 저장: {} ({})", name, addr);
        self.peers.push(Peer {
            name: name.to_string(),
            addr,
        });
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let book = PeerBook::load(dir.path().join("peers.txt")).unwrap();
        assert!(book.peers().is_empty());
    }

    #[test]
    fn test_add_dedupes_by_address() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("peers.txt");

        let mut book = PeerBook::load(&path).unwrap();
        let ip: IpAddr = "192.168.1.20".parse().unwrap();
        assert!(book.add("laptop", ip).unwrap());
        assert!(!book.add("other-name", ip).unwrap());
        assert!(book.add("desk", "192.168.1.21".parse().unwrap()).unwrap());

        let reloaded = PeerBook::load(&path).unwrap();
        assert_eq!(reloaded.peers().len(), 2);
        assert_eq!(reloaded.find("laptop").unwrap().addr, ip);
        assert_eq!(reloaded.find("192.168.1.21").unwrap().name, "desk");
        assert!(reloaded.find("nobody").is_none());

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "laptop,192.168.1.20\ndesk,192.168.1.21\n");
    }

    #[test]
    fn test_malformed_line_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("peers.txt");
        std::fs::write(&path, "ok,10.0.0.1\nbroken line\n").unwrap();
        assert!(matches!(PeerBook::load(&path), Err(Error::PeerBook { .. })));

        let mut book = PeerBook::load(dir.path().join("fresh.txt")).unwrap();
        assert!(book.add("a,b", "10.0.0.2".parse().unwrap()).is_err());
    }
}
