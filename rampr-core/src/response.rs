/// The parts of an HTTP response the driver keeps after reading it.
#[derive(Debug, Clone)]
pub struct Response {
    status: u16,
    body_len: usize,
    headers_size: usize,
}

impl Response {
    pub async fn new(res: reqwest::Response) -> Result<Self, reqwest::Error> {
        let status = res.status().as_u16();
        // Header block approximated as "name: value\r\n" per entry plus the status line
        let headers_size = res
            .headers()
            .iter()
            .map(|(k, v)| k.as_str().len() + v.len() + 4)
            .sum::<usize>()
            + 12;
        let body = res.bytes().await?;
        Ok(Self {
            status,
            body_len: body.len(),
            headers_size,
        })
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn body_len(&self) -> usize {
        self.body_len
    }

    /// Returns total response size (body + headers + status line approximation)
    pub fn total_size(&self) -> usize {
        self.body_len + self.headers_size
    }
}
