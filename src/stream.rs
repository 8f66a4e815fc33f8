//! Block streamer bridging `Read`/`Write` collections to the in-memory
//! codecs.
//!
//! Each iteration reads up to one block from every stream with read-full
//! semantics; the first present stream that yields bytes sets the logical
//! size `s` of the iteration. Shorter present streams are zero-extended to
//! `s`, longer reads are trimmed, and the block is padded out to the next
//! shard-size multiple before it is handed to the codec. Parity outputs are
//! written padded; reconstructed data outputs are written at the logical
//! size. When concurrency is enabled, per-stream reads and writes fan out
//! across workers with a barrier before and after every codec invocation;
//! codec invocations themselves never overlap.

use crate::error::{Error, Result};
use crate::shards::{align_up, SHARD_SIZE_MULTIPLE};
use crate::ReedSolomon;
use log::debug;
use rayon::prelude::*;
use std::io::{Read, Write};

/// Default stream block size: 4 MiB per shard and iteration.
pub const DEFAULT_BLOCK_SIZE: usize = 4 << 20;

#[derive(Debug, Clone, Copy)]
pub(crate) struct StreamOptions {
    pub block_size: usize,
    pub concurrent_io: bool,
}

impl Default for StreamOptions {
    fn default() -> Self {
        StreamOptions {
            block_size: DEFAULT_BLOCK_SIZE,
            concurrent_io: false,
        }
    }
}

/// `Read::read` until the buffer is full or EOF, returning the byte count
/// instead of failing on a short read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Read one block from every present stream into its row. Returns the
/// logical size of the iteration, or `None` when every present stream is at
/// EOF. Absent streams leave their rows empty.
fn read_block<R: Read + Send>(
    inputs: &mut [Option<&mut R>],
    rows: &mut [Vec<u8>],
    block_size: usize,
    concurrent: bool,
) -> Result<Option<usize>> {
    for (input, row) in inputs.iter().zip(rows.iter_mut()) {
        if input.is_some() {
            row.resize(block_size, 0);
        } else {
            row.clear();
        }
    }

    let mut sizes = vec![0usize; rows.len()];
    if concurrent {
        let results: Vec<std::io::Result<usize>> = inputs
            .par_iter_mut()
            .zip(rows.par_iter_mut())
            .map(|(input, row)| match input {
                Some(reader) => read_full(reader, row),
                None => Ok(0),
            })
            .collect();
        for (i, res) in results.into_iter().enumerate() {
            sizes[i] = res.map_err(|e| Error::StreamRead { stream: i, source: e })?;
        }
    } else {
        for (i, (input, row)) in inputs.iter_mut().zip(rows.iter_mut()).enumerate() {
            if let Some(reader) = input {
                sizes[i] = read_full(reader, row)
                    .map_err(|e| Error::StreamRead { stream: i, source: e })?;
            }
        }
    }

    // The first present stream that produced bytes sets the logical size.
    let Some(size) = inputs
        .iter()
        .zip(&sizes)
        .find_map(|(input, &n)| (input.is_some() && n > 0).then_some(n))
    else {
        return Ok(None);
    };

    // Padding contract: zero-extend or trim every present row to the
    // logical size, then pad out to the alignment the codec requires.
    let padded = align_up(size, SHARD_SIZE_MULTIPLE);
    for (i, row) in rows.iter_mut().enumerate() {
        if inputs[i].is_none() {
            continue;
        }
        let keep = sizes[i].min(size);
        row[keep..padded].fill(0);
        row.truncate(padded);
    }
    Ok(Some(size))
}

/// Write `rows[i][..size]` to every present writer.
fn write_rows<W: Write + Send>(
    outputs: &mut [Option<&mut W>],
    rows: &[Vec<u8>],
    sizes: &[usize],
    concurrent: bool,
) -> Result<()> {
    if concurrent {
        let results: Vec<std::io::Result<()>> = outputs
            .par_iter_mut()
            .zip(rows.par_iter().zip(sizes.par_iter()))
            .map(|(output, (row, &size))| match output {
                Some(writer) => writer.write_all(&row[..size]),
                None => Ok(()),
            })
            .collect();
        for (i, res) in results.into_iter().enumerate() {
            res.map_err(|e| Error::StreamWrite { stream: i, source: e })?;
        }
        Ok(())
    } else {
        for (i, (output, (row, &size))) in
            outputs.iter_mut().zip(rows.iter().zip(sizes.iter())).enumerate()
        {
            if let Some(writer) = output {
                writer
                    .write_all(&row[..size])
                    .map_err(|e| Error::StreamWrite { stream: i, source: e })?;
            }
        }
        Ok(())
    }
}

impl ReedSolomon {
    /// Read the `data_shards()` input streams block by block, producing the
    /// parity streams. A `None` output slot discards that parity shard.
    /// Parity is written at the padded block size; the receiver is expected
    /// to know its shard geometry.
    pub fn stream_encode<R: Read + Send, W: Write + Send>(
        &self,
        inputs: &mut [R],
        outputs: &mut [Option<W>],
    ) -> Result<()> {
        if inputs.len() != self.data_shards() {
            return Err(Error::TooFewShards);
        }
        if outputs.len() != self.parity_shards() {
            return Err(Error::TooFewShards);
        }

        let k = self.data_shards();
        let mut rows = vec![Vec::new(); self.total_shards()];
        let mut read_any = false;
        loop {
            let mut input_refs: Vec<Option<&mut R>> = inputs.iter_mut().map(Some).collect();
            let Some(size) = read_block(
                &mut input_refs,
                &mut rows[..k],
                self.stream.block_size,
                self.stream.concurrent_io,
            )?
            else {
                return if read_any { Ok(()) } else { Err(Error::ShardNoData) };
            };
            read_any = true;

            let padded = align_up(size, SHARD_SIZE_MULTIPLE);
            for row in rows[k..].iter_mut() {
                row.clear();
                row.resize(padded, 0);
            }
            self.encode(&mut rows)?;
            debug!("stream encode: processed block of {size} bytes");

            let mut output_refs: Vec<Option<&mut W>> =
                outputs.iter_mut().map(|o| o.as_mut()).collect();
            let sizes = vec![padded; self.parity_shards()];
            write_rows(&mut output_refs, &rows[k..], &sizes, self.stream.concurrent_io)?;
        }
    }

    /// Verify a full shard set of streams block by block. Returns
    /// `ShardNoData` when the streams are empty on entry.
    pub fn stream_verify<R: Read + Send>(&self, shards: &mut [R]) -> Result<bool> {
        if shards.is_empty() {
            return Err(Error::EmptyShards);
        }
        if shards.len() != self.total_shards() {
            return Err(Error::TooFewShards);
        }

        let mut rows = vec![Vec::new(); self.total_shards()];
        let mut read_any = false;
        loop {
            let mut refs: Vec<Option<&mut R>> = shards.iter_mut().map(Some).collect();
            match read_block(&mut refs, &mut rows, self.stream.block_size, self.stream.concurrent_io)? {
                None => {
                    return if read_any { Ok(true) } else { Err(Error::ShardNoData) };
                }
                Some(_) => {
                    read_any = true;
                    if !self.verify(&rows)? {
                        return Ok(false);
                    }
                }
            }
        }
    }

    /// Rebuild missing shards from stream inputs into stream outputs.
    /// Absent shards are `None` inputs; each absent shard that should be
    /// materialized carries a writer in its output slot. A slot with both an
    /// input and an output is rejected. Reconstructed data shards are
    /// written at the logical size, parity shards at the padded size.
    pub fn stream_reconstruct<R: Read + Send, W: Write + Send>(
        &self,
        inputs: &mut [Option<R>],
        outputs: &mut [Option<W>],
    ) -> Result<()> {
        self.stream_reconstruct_inner(inputs, outputs, false)
    }

    /// Like [`stream_reconstruct`](Self::stream_reconstruct), but only data
    /// shards are materialized; parity output slots are ignored.
    pub fn stream_reconstruct_data<R: Read + Send, W: Write + Send>(
        &self,
        inputs: &mut [Option<R>],
        outputs: &mut [Option<W>],
    ) -> Result<()> {
        self.stream_reconstruct_inner(inputs, outputs, true)
    }

    fn stream_reconstruct_inner<R: Read + Send, W: Write + Send>(
        &self,
        inputs: &mut [Option<R>],
        outputs: &mut [Option<W>],
        data_only: bool,
    ) -> Result<()> {
        let n = self.total_shards();
        let k = self.data_shards();
        if inputs.len() != n || outputs.len() != n {
            return Err(Error::TooFewShards);
        }
        for (input, output) in inputs.iter().zip(outputs.iter()) {
            if input.is_some() && output.is_some() {
                return Err(Error::ReconstructMismatch);
            }
        }
        let recover_parity =
            !data_only && outputs[k..].iter().any(|output| output.is_some());

        let mut rows = vec![Vec::new(); n];
        let mut read_any = false;
        loop {
            let mut input_refs: Vec<Option<&mut R>> =
                inputs.iter_mut().map(|i| i.as_mut()).collect();
            let Some(size) = read_block(
                &mut input_refs,
                &mut rows,
                self.stream.block_size,
                self.stream.concurrent_io,
            )?
            else {
                return if read_any { Ok(()) } else { Err(Error::ShardNoData) };
            };
            read_any = true;

            if recover_parity {
                self.reconstruct(&mut rows)?;
            } else {
                self.reconstruct_data(&mut rows)?;
            }
            debug!("stream reconstruct: processed block of {size} bytes");

            let padded = align_up(size, SHARD_SIZE_MULTIPLE);
            let sizes: Vec<usize> = (0..n).map(|i| if i < k { size } else { padded }).collect();
            let mut output_refs: Vec<Option<&mut W>> = outputs
                .iter_mut()
                .enumerate()
                .map(|(i, o)| {
                    if data_only && i >= k {
                        None
                    } else {
                        o.as_mut()
                    }
                })
                .collect();
            write_rows(&mut output_refs, &rows, &sizes, self.stream.concurrent_io)?;
        }
    }

    /// Split a stream of `size` bytes into the `data_shards()` writers.
    /// Every shard receives `align64(ceil(size / k))` bytes except possibly
    /// the last, which receives the remaining payload zero-extended to the
    /// alignment. Fails with `ShortData` when the reader underflows `size`.
    pub fn stream_split<R: Read, W: Write>(
        &self,
        mut data: R,
        dst: &mut [Option<W>],
        size: u64,
    ) -> Result<()> {
        if dst.len() != self.data_shards() {
            return Err(Error::TooFewShards);
        }
        if size == 0 {
            return Err(Error::ShortData);
        }
        if dst.iter().any(|writer| writer.is_none()) {
            return Err(Error::NilWriter);
        }

        let k = self.data_shards() as u64;
        let per_shard = align_up_u64(size.div_ceil(k), SHARD_SIZE_MULTIPLE as u64);
        let remainder = size.saturating_sub(per_shard * (k - 1));

        let mut buf = vec![0u8; 64 << 10];
        let mut payload_left = size;
        for (i, writer) in dst.iter_mut().enumerate() {
            let writer = writer.as_mut().expect("checked above");
            let target = if i as u64 == k - 1 && remainder > 0 {
                align_up_u64(remainder, SHARD_SIZE_MULTIPLE as u64)
            } else {
                per_shard
            };

            let mut real = target.min(payload_left);
            payload_left -= real;
            let mut zeros = target - real;
            while real > 0 {
                let chunk = real.min(buf.len() as u64) as usize;
                let n = read_full(&mut data, &mut buf[..chunk])
                    .map_err(|e| Error::StreamRead { stream: 0, source: e })?;
                if n < chunk {
                    return Err(Error::ShortData);
                }
                writer
                    .write_all(&buf[..n])
                    .map_err(|e| Error::StreamWrite { stream: i, source: e })?;
                real -= n as u64;
            }
            buf.fill(0);
            while zeros > 0 {
                let chunk = zeros.min(buf.len() as u64) as usize;
                writer
                    .write_all(&buf[..chunk])
                    .map_err(|e| Error::StreamWrite { stream: i, source: e })?;
                zeros -= chunk as u64;
            }
        }
        Ok(())
    }

    /// Concatenate the data shard streams, emitting exactly `out_size`
    /// bytes and trimming the zero padding of the final shard. Accepts
    /// either the `data_shards()` streams or the full shard set, in which
    /// case only the first `data_shards()` streams are consumed.
    pub fn stream_join<R: Read, W: Write>(
        &self,
        dst: &mut W,
        shards: &mut [R],
        out_size: u64,
    ) -> Result<()> {
        if shards.is_empty() {
            return Err(Error::EmptyShards);
        }
        if shards.len() < self.data_shards() {
            return Err(Error::TooFewShards);
        }
        if out_size == 0 {
            return Err(Error::Size);
        }

        let k = self.data_shards();
        let shards = &mut shards[..k];
        let per_shard = align_up_u64(out_size.div_ceil(k as u64), SHARD_SIZE_MULTIPLE as u64);

        let mut buf = vec![0u8; 64 << 10];
        let mut written = 0u64;
        for (i, shard) in shards.iter_mut().enumerate() {
            let mut take = per_shard.min(out_size - written);
            while take > 0 {
                let chunk = take.min(buf.len() as u64) as usize;
                let n = read_full(shard, &mut buf[..chunk])
                    .map_err(|e| Error::StreamRead { stream: i, source: e })?;
                if n == 0 {
                    return Err(Error::ShortData);
                }
                dst.write_all(&buf[..n])
                    .map_err(|e| Error::StreamWrite { stream: i, source: e })?;
                written += n as u64;
                take -= n as u64;
            }
            if written == out_size {
                return Ok(());
            }
        }
        Err(Error::ShortData)
    }
}

fn align_up_u64(n: u64, multiple: u64) -> u64 {
    n.div_ceil(multiple) * multiple
}
