//! Blocking TCP client
//!
//! Used by the CLI and by nodes talking to their peers.

use std::io::{BufReader, BufWriter};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::cluster::Consistency;
use crate::error::{Result, ShardError};
use crate::protocol::{read_response, write_command, Command, Response, ScanPage, Status};

pub struct Client {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl Client {
    /// Connect to `addr`; `timeout` bounds the connect and every read/write
    pub fn connect(addr: &str, timeout: Option<Duration>) -> Result<Self> {
        let stream = match timeout {
            Some(timeout) => {
                let socket_addr = addr
                    .to_socket_addrs()?
                    .next()
                    .ok_or_else(|| ShardError::Network(format!("cannot resolve {}", addr)))?;
                TcpStream::connect_timeout(&socket_addr, timeout)?
            }
            None => TcpStream::connect(addr)?,
        };
        stream.set_nodelay(true)?;
        stream.set_read_timeout(timeout)?;
        stream.set_write_timeout(timeout)?;

        let read_stream = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(stream),
        })
    }

    /// Send one command and wait for its response
    pub fn call(&mut self, command: &Command) -> Result<Response> {
        write_command(&mut self.writer, command)?;
        read_response(&mut self.reader)
    }

    pub fn get(&mut self, key: &[u8], consistency: Option<Consistency>) -> Result<Option<Vec<u8>>> {
        let response = self.call(&Command::Get {
            key: key.to_vec(),
            consistency,
        })?;
        match response.status {
            Status::Ok => Ok(Some(response.payload.unwrap_or_default())),
            Status::NotFound => Ok(None),
            _ => Err(response.into_error()),
        }
    }

    pub fn put(&mut self, key: &[u8], value: &[u8], consistency: Option<Consistency>) -> Result<()> {
        let response = self.call(&Command::Put {
            key: key.to_vec(),
            value: value.to_vec(),
            consistency,
        })?;
        expect_ok(response)
    }

    pub fn delete(&mut self, key: &[u8], consistency: Option<Consistency>) -> Result<()> {
        let response = self.call(&Command::Delete {
            key: key.to_vec(),
            consistency,
        })?;
        expect_ok(response)
    }

    /// One page of the node-local scan
    pub fn scan(
        &mut self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        after: Option<&[u8]>,
        limit: Option<u32>,
    ) -> Result<ScanPage> {
        self.call(&Command::Scan {
            start: start.map(<[u8]>::to_vec),
            end: end.map(<[u8]>::to_vec),
            after: after.map(<[u8]>::to_vec),
            limit,
        })?
        .into_scan_page()
    }

    pub fn ping(&mut self) -> Result<()> {
        self.call(&Command::Ping)?.into_pong()
    }
}

fn expect_ok(response: Response) -> Result<()> {
    if response.is_ok() {
        Ok(())
    } else {
        Err(response.into_error())
    }
}
