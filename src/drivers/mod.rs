pub mod edgedriver;
