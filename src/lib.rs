pub mod bencode_parser;
pub mod config;
pub mod harvest;
pub mod info_hash;
pub mod peer;
pub mod percent;
pub mod server;
pub mod store;
pub mod torrent_file;
pub mod tracker;
