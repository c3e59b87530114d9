//! Scripted [`VendorApi`] implementation shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};

use crate::vendor::{
    ChallengeCheckReply, ChallengeReply, LoginReply, ReserveListReply, SignReply, SubmitReply,
    VendorApi, VendorError, types::ChallengeImages, types::ReserveListData, types::ReserveItem,
};

pub const BUSY: &str = "当前人数过多，请稍后再试";
pub const NOT_OPEN: &str = "未到开放时间";
pub const TAKEN: &str = "该座位已被预约";
pub const EXPIRED: &str = "请先登录";

/// Seat page HTML matching the negotiator's primary patterns.
pub const PAGE_HTML: &str =
    r#"<script>var token = 'page-tok'; var conf = { deptIdEnc: "dept-1" };</script>"#;

/// Seat page HTML that looks like the vendor's login prompt.
pub const LOGIN_PAGE_HTML: &str = "<html><title>用户登录</title></html>";

/// In-memory vendor with per-seat scripted submit replies.
///
/// Each seat pops replies off its queue; an exhausted queue serves the
/// default reply, so "keeps answering busy forever" is one line of setup.
pub struct ScriptedVendor {
    pub page_html: Mutex<String>,
    pub login_status: bool,
    pub login_calls: AtomicU32,
    pub page_calls: AtomicU32,
    pub submit_calls: AtomicU32,
    pub challenge_fetches: AtomicU32,
    pub sign_calls: AtomicU32,
    pub reservations: Mutex<Vec<ReserveItem>>,
    challenge_accept: bool,
    replies: Mutex<HashMap<String, VecDeque<SubmitReply>>>,
    default_reply: SubmitReply,
}

impl ScriptedVendor {
    pub const VALIDATE_TOKEN: &'static str = "validate_scripted";

    pub fn new() -> Self {
        Self {
            page_html: Mutex::new(PAGE_HTML.to_string()),
            login_status: true,
            login_calls: AtomicU32::new(0),
            page_calls: AtomicU32::new(0),
            submit_calls: AtomicU32::new(0),
            challenge_fetches: AtomicU32::new(0),
            sign_calls: AtomicU32::new(0),
            reservations: Mutex::new(Vec::new()),
            challenge_accept: true,
            replies: Mutex::new(HashMap::new()),
            default_reply: reply(false, BUSY),
        }
    }

    pub fn failing_login() -> Self {
        Self {
            login_status: false,
            ..Self::new()
        }
    }

    pub fn rejecting_challenges(mut self) -> Self {
        self.challenge_accept = false;
        self
    }

    pub fn with_default_reply(mut self, success: bool, msg: &str) -> Self {
        self.default_reply = reply(success, msg);
        self
    }

    pub fn with_page_html(self, html: &str) -> Self {
        *self.page_html.lock().unwrap() = html.to_string();
        self
    }

    /// Queue scripted submit replies for one seat.
    pub fn script(self, seat: &str, outcomes: &[(bool, &str)]) -> Self {
        let queue: VecDeque<SubmitReply> =
            outcomes.iter().map(|(ok, msg)| reply(*ok, msg)).collect();
        self.replies
            .lock()
            .unwrap()
            .insert(seat.to_string(), queue);
        self
    }
}

fn reply(success: bool, msg: &str) -> SubmitReply {
    SubmitReply {
        success,
        msg: Some(msg.to_string()),
    }
}

/// Synthetic background/cutout pair with the piece cut at x = 120.
fn synthetic_challenge() -> (String, String) {
    const TILE: u32 = 30;
    const BORDER: u32 = 4;
    let on_border = |x: u32, y: u32| {
        x < BORDER || y < BORDER || x >= TILE - BORDER || y >= TILE - BORDER
    };

    let mut background = RgbImage::from_pixel(260, 120, Rgb([255, 255, 255]));
    for y in 0..TILE {
        for x in 0..TILE {
            let v = if on_border(x, y) { 0 } else { 255 };
            background.put_pixel(120 + x, 40 + y, Rgb([v, v, v]));
        }
    }

    let mut cutout = RgbaImage::from_pixel(60, 60, Rgba([0, 0, 0, 0]));
    for y in 0..TILE {
        for x in 0..TILE {
            let v = if on_border(x, y) { 0 } else { 255 };
            cutout.put_pixel(10 + x, 10 + y, Rgba([v, v, v, 255]));
        }
    }

    let png = |img: DynamicImage| {
        let mut buf = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        BASE64.encode(buf)
    };
    (
        png(DynamicImage::ImageRgb8(background)),
        png(DynamicImage::ImageRgba8(cutout)),
    )
}

impl VendorApi for ScriptedVendor {
    async fn login(&self, _user: &str, _pass: &str) -> Result<LoginReply, VendorError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        Ok(LoginReply {
            status: self.login_status,
            msg2: (!self.login_status).then(|| "账号或密码错误".to_string()),
        })
    }

    async fn fetch_seat_page(&self, _room: &str, _seat: &str) -> Result<String, VendorError> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.page_html.lock().unwrap().clone())
    }

    async fn fetch_challenge(
        &self,
        _captcha_key: &str,
        _token: &str,
    ) -> Result<ChallengeReply, VendorError> {
        self.challenge_fetches.fetch_add(1, Ordering::SeqCst);
        let (shade, cutout) = synthetic_challenge();
        Ok(ChallengeReply {
            token: "chal-scripted".to_string(),
            images: ChallengeImages {
                shade_image: shade,
                cutout_image: cutout,
            },
        })
    }

    async fn check_challenge(
        &self,
        _token: &str,
        _offset: u32,
    ) -> Result<ChallengeCheckReply, VendorError> {
        if self.challenge_accept {
            Ok(ChallengeCheckReply {
                result: true,
                extra_data: Some(format!(r#"{{"validate":"{}"}}"#, Self::VALIDATE_TOKEN)),
            })
        } else {
            Ok(ChallengeCheckReply {
                result: false,
                extra_data: None,
            })
        }
    }

    async fn submit(&self, params: &[(String, String)]) -> Result<SubmitReply, VendorError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        let seat = params
            .iter()
            .find(|(k, _)| k == "seatNum")
            .map(|(_, v)| v.clone())
            .unwrap_or_default();
        let mut replies = self.replies.lock().unwrap();
        let scripted = replies.get_mut(&seat).and_then(|queue| queue.pop_front());
        Ok(scripted.unwrap_or_else(|| self.default_reply.clone()))
    }

    async fn reserve_list(&self) -> Result<ReserveListReply, VendorError> {
        Ok(ReserveListReply {
            data: ReserveListData {
                reserve_list: self.reservations.lock().unwrap().clone(),
            },
        })
    }

    async fn sign_in(&self, _reservation_id: i64) -> Result<SignReply, VendorError> {
        self.sign_calls.fetch_add(1, Ordering::SeqCst);
        Ok(SignReply {
            success: true,
            msg: None,
        })
    }
}
